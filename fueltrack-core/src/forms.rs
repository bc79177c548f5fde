//! Raw user input for new records and its validation.
//!
//! Forms hold the strings a user typed. `validate` turns them into a model
//! value or a [`ValidationError`]; nothing invalid reaches the record store.

use chrono::NaiveDate;
use thiserror::Error;

use crate::metrics::{round2, suggested_price, suggested_total_cost};
use crate::models::{
    parse_amount, FuelEntry, FuelType, PaymentMode, ServiceEntry, Vehicle, VehicleCategory,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must be a number, got '{value}'")]
    NotANumber { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("{field} cannot be negative")]
    Negative { field: &'static str },
    #[error("Invalid date '{0}'. Use YYYY-MM-DD.")]
    InvalidDate(String),
    #[error("{0}")]
    InvalidChoice(String),
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Missing { field })
    } else {
        Ok(trimmed)
    }
}

fn number(field: &'static str, value: &str) -> Result<f64, ValidationError> {
    let raw = required(field, value)?;
    parse_amount(raw).ok_or_else(|| ValidationError::NotANumber {
        field,
        value: raw.to_string(),
    })
}

fn non_negative(field: &'static str, value: &str) -> Result<f64, ValidationError> {
    let n = number(field, value)?;
    if n < 0.0 {
        return Err(ValidationError::Negative { field });
    }
    Ok(n)
}

fn positive(field: &'static str, value: &str) -> Result<f64, ValidationError> {
    let n = number(field, value)?;
    if n <= 0.0 {
        return Err(ValidationError::NotPositive { field });
    }
    Ok(n)
}

/// Parses `YYYY-MM-DD`, falling back to `today` when no date was given.
pub fn parse_date(value: Option<&str>, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map_err(|_| ValidationError::InvalidDate(raw.to_string())),
        None => Ok(today),
    }
}

fn optional_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default)]
pub struct VehicleForm {
    pub name: String,
    pub category: String,
    pub fuel_type: String,
    pub registration_number: Option<String>,
}

impl VehicleForm {
    pub fn validate(&self) -> Result<Vehicle, ValidationError> {
        let name = required("name", &self.name)?;
        let category: VehicleCategory = required("category", &self.category)?
            .parse()
            .map_err(ValidationError::InvalidChoice)?;
        let fuel_type: FuelType = required("fuel type", &self.fuel_type)?
            .parse()
            .map_err(ValidationError::InvalidChoice)?;

        let mut vehicle = Vehicle::new(name, category, fuel_type);
        vehicle.registration_number = optional_text(&self.registration_number);
        Ok(vehicle)
    }
}

/// A fill-up as typed. Either the price or the total cost may be omitted;
/// the missing one is derived from the other.
#[derive(Debug, Clone, Default)]
pub struct FuelEntryForm {
    pub vehicle_id: String,
    pub date: Option<String>,
    pub odometer: String,
    pub liters: String,
    pub price: Option<String>,
    pub total_cost: Option<String>,
}

impl FuelEntryForm {
    /// Prefills a form from an existing entry, for editing.
    pub fn from_entry(entry: &FuelEntry) -> Self {
        Self {
            vehicle_id: entry.vehicle_id.clone(),
            date: Some(entry.date.format(DATE_FORMAT).to_string()),
            odometer: entry.odometer.to_string(),
            liters: entry.liters.to_string(),
            price: Some(entry.price.to_string()),
            total_cost: Some(entry.total_cost.to_string()),
        }
    }

    pub fn validate(&self, today: NaiveDate) -> Result<FuelEntry, ValidationError> {
        let vehicle_id = required("vehicle", &self.vehicle_id)?;
        let date = parse_date(self.date.as_deref(), today)?;
        let odometer = non_negative("odometer", &self.odometer)?;
        let liters = positive("liters", &self.liters)?;

        let price = optional_text(&self.price);
        let total_cost = optional_text(&self.total_cost);

        let (price, total_cost) = match (price, total_cost) {
            (Some(price), Some(total)) => (
                positive("price", &price)?,
                non_negative("total cost", &total)?,
            ),
            (Some(price), None) => {
                let price = positive("price", &price)?;
                let total = suggested_total_cost(liters, price)
                    .ok_or(ValidationError::NotPositive { field: "price" })?;
                (price, total)
            }
            (None, Some(total)) => {
                let total = non_negative("total cost", &total)?;
                let price = suggested_price(total, liters)
                    .ok_or(ValidationError::NotPositive { field: "liters" })?;
                if price <= 0.0 {
                    return Err(ValidationError::NotPositive { field: "price" });
                }
                (price, round2(total))
            }
            (None, None) => return Err(ValidationError::Missing { field: "price" }),
        };

        Ok(FuelEntry::new(
            vehicle_id, date, odometer, liters, price, total_cost,
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceEntryForm {
    pub vehicle_id: String,
    pub date: Option<String>,
    pub odometer: String,
    pub service_type: String,
    pub cost: Option<String>,
    pub payment_mode: Option<String>,
    pub notes: Option<String>,
}

impl ServiceEntryForm {
    pub fn from_entry(entry: &ServiceEntry) -> Self {
        Self {
            vehicle_id: entry.vehicle_id.clone(),
            date: Some(entry.date.format(DATE_FORMAT).to_string()),
            odometer: entry.odometer.to_string(),
            service_type: entry.service_type.clone(),
            cost: Some(entry.cost.to_string()),
            payment_mode: Some(entry.payment_mode.to_string()),
            notes: entry.notes.clone(),
        }
    }

    pub fn validate(&self, today: NaiveDate) -> Result<ServiceEntry, ValidationError> {
        let vehicle_id = required("vehicle", &self.vehicle_id)?;
        let date = parse_date(self.date.as_deref(), today)?;
        let odometer = non_negative("odometer", &self.odometer)?;
        let service_type = required("service type", &self.service_type)?;

        // An unparseable cost is recorded as free rather than rejected.
        let cost = self
            .cost
            .as_deref()
            .and_then(parse_amount)
            .filter(|c| *c >= 0.0)
            .unwrap_or(0.0);

        let payment_mode = match optional_text(&self.payment_mode) {
            Some(raw) => raw
                .parse::<PaymentMode>()
                .map_err(ValidationError::InvalidChoice)?,
            None => PaymentMode::default(),
        };

        let mut entry = ServiceEntry::new(vehicle_id, date, odometer, service_type, cost)
            .with_payment_mode(payment_mode);
        entry.notes = optional_text(&self.notes);
        Ok(entry)
    }
}
