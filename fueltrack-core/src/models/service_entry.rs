use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::amount::lenient_amount;
use super::ids::{guest_owner, new_record_id, GUEST_OWNER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentMode {
    #[default]
    Cash,
    Online,
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMode::Cash => write!(f, "Cash"),
            PaymentMode::Online => write!(f, "Online"),
        }
    }
}

impl FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMode::Cash),
            "online" => Ok(PaymentMode::Online),
            _ => Err(format!(
                "Invalid payment mode '{}'. Valid options: cash, online",
                s
            )),
        }
    }
}

/// A maintenance event for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub id: String,
    pub vehicle_id: String,
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub odometer: f64,
    pub service_type: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub cost: f64,
    #[serde(default)]
    pub payment_mode: PaymentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default = "guest_owner")]
    pub owner_id: String,
}

impl ServiceEntry {
    pub fn new(
        vehicle_id: impl Into<String>,
        date: NaiveDate,
        odometer: f64,
        service_type: impl Into<String>,
        cost: f64,
    ) -> Self {
        Self {
            id: new_record_id(),
            vehicle_id: vehicle_id.into(),
            date,
            odometer,
            service_type: service_type.into(),
            cost,
            payment_mode: PaymentMode::default(),
            notes: None,
            owner_id: GUEST_OWNER.to_string(),
        }
    }

    pub fn with_payment_mode(mut self, payment_mode: PaymentMode) -> Self {
        self.payment_mode = payment_mode;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

impl fmt::Display for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {} km  {}  {:.2} ({})",
            self.date, self.odometer, self.service_type, self.cost, self.payment_mode
        )?;
        if let Some(notes) = &self.notes {
            write!(f, "  - {}", notes)?;
        }
        Ok(())
    }
}
