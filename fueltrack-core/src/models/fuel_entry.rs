use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::amount::lenient_amount;
use super::ids::{guest_owner, new_record_id, GUEST_OWNER};

/// One fill-up of one vehicle.
///
/// `total_cost` is stored as submitted and is not re-derived from
/// `liters * price` on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelEntry {
    pub id: String,
    pub vehicle_id: String,
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub odometer: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub liters: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_cost: f64,
    #[serde(default = "guest_owner")]
    pub owner_id: String,
}

impl FuelEntry {
    pub fn new(
        vehicle_id: impl Into<String>,
        date: NaiveDate,
        odometer: f64,
        liters: f64,
        price: f64,
        total_cost: f64,
    ) -> Self {
        Self {
            id: new_record_id(),
            vehicle_id: vehicle_id.into(),
            date,
            odometer,
            liters,
            price,
            total_cost,
            owner_id: GUEST_OWNER.to_string(),
        }
    }
}

impl fmt::Display for FuelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {} km  {} L @ {:.2}  = {:.2}",
            self.date, self.odometer, self.liters, self.price, self.total_cost
        )
    }
}
