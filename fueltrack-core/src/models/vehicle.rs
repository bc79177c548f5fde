use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{guest_owner, new_record_id, GUEST_OWNER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleCategory {
    Bike,
    Car,
    Scooty,
    Auto,
    Bus,
    Truck,
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleCategory::Bike => write!(f, "Bike"),
            VehicleCategory::Car => write!(f, "Car"),
            VehicleCategory::Scooty => write!(f, "Scooty"),
            VehicleCategory::Auto => write!(f, "Auto"),
            VehicleCategory::Bus => write!(f, "Bus"),
            VehicleCategory::Truck => write!(f, "Truck"),
        }
    }
}

impl FromStr for VehicleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bike" => Ok(VehicleCategory::Bike),
            "car" => Ok(VehicleCategory::Car),
            "scooty" => Ok(VehicleCategory::Scooty),
            "auto" => Ok(VehicleCategory::Auto),
            "bus" => Ok(VehicleCategory::Bus),
            "truck" => Ok(VehicleCategory::Truck),
            _ => Err(format!(
                "Invalid vehicle category '{}'. Valid options: bike, car, scooty, auto, bus, truck",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuelType {
    Petrol,
    Diesel,
    #[serde(rename = "CNG")]
    Cng,
    Electric,
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuelType::Petrol => write!(f, "Petrol"),
            FuelType::Diesel => write!(f, "Diesel"),
            FuelType::Cng => write!(f, "CNG"),
            FuelType::Electric => write!(f, "Electric"),
        }
    }
}

impl FromStr for FuelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "petrol" => Ok(FuelType::Petrol),
            "diesel" => Ok(FuelType::Diesel),
            "cng" => Ok(FuelType::Cng),
            "electric" => Ok(FuelType::Electric),
            _ => Err(format!(
                "Invalid fuel type '{}'. Valid options: petrol, diesel, cng, electric",
                s
            )),
        }
    }
}

/// A vehicle owned by one user.
///
/// Vehicles are never edited after creation except to backfill the
/// registration number, and are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub name: String,
    pub category: VehicleCategory,
    pub fuel_type: FuelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
    #[serde(default = "guest_owner")]
    pub owner_id: String,
}

impl Vehicle {
    pub fn new(name: impl Into<String>, category: VehicleCategory, fuel_type: FuelType) -> Self {
        Self {
            id: new_record_id(),
            name: name.into(),
            category,
            fuel_type,
            registration_number: None,
            owner_id: GUEST_OWNER.to_string(),
        }
    }

    pub fn with_registration_number(mut self, number: impl Into<String>) -> Self {
        self.registration_number = Some(number.into());
        self
    }

    /// The starter fleet offered when a user has no vehicles yet.
    pub fn starter_fleet() -> Vec<Vehicle> {
        vec![
            Vehicle::new("Activa 5G", VehicleCategory::Bike, FuelType::Petrol),
            Vehicle::new("Yamaha FZ Hybrid", VehicleCategory::Bike, FuelType::Petrol),
            Vehicle::new("Maruti Suzuki Dzire", VehicleCategory::Car, FuelType::Petrol),
        ]
    }
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} • {})", self.name, self.category, self.fuel_type)?;
        if let Some(number) = &self.registration_number {
            write!(f, " [{}]", number)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_new_is_guest_owned() {
        let vehicle = Vehicle::new("Dzire", VehicleCategory::Car, FuelType::Petrol);
        assert_eq!(vehicle.owner_id, GUEST_OWNER);
        assert!(vehicle.registration_number.is_none());
        assert!(!vehicle.id.is_empty());
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!(
            VehicleCategory::from_str("scooty").unwrap(),
            VehicleCategory::Scooty
        );
        assert_eq!(VehicleCategory::from_str("TRUCK").unwrap(), VehicleCategory::Truck);
        assert!(VehicleCategory::from_str("boat").is_err());
    }

    #[test]
    fn test_fuel_type_from_str_and_display() {
        assert_eq!(FuelType::from_str("CNG").unwrap(), FuelType::Cng);
        assert_eq!(FuelType::Cng.to_string(), "CNG");
        assert!(FuelType::from_str("hydrogen").is_err());
    }

    #[test]
    fn test_vehicle_json_uses_camel_case() {
        let vehicle = Vehicle::new("Activa", VehicleCategory::Scooty, FuelType::Cng)
            .with_registration_number("RJ09FS3881");
        let json = serde_json::to_value(&vehicle).unwrap();

        assert_eq!(json["fuelType"], "CNG");
        assert_eq!(json["category"], "Scooty");
        assert_eq!(json["registrationNumber"], "RJ09FS3881");
        assert_eq!(json["ownerId"], "guest");
    }

    #[test]
    fn test_vehicle_missing_owner_defaults_to_guest() {
        let vehicle: Vehicle = serde_json::from_str(
            r#"{"id":"1","name":"Bus","category":"Bus","fuelType":"Diesel"}"#,
        )
        .unwrap();
        assert_eq!(vehicle.owner_id, GUEST_OWNER);
        assert!(vehicle.registration_number.is_none());
    }

    #[test]
    fn test_vehicle_display() {
        let vehicle = Vehicle::new("Dzire", VehicleCategory::Car, FuelType::Petrol)
            .with_registration_number("RJ09CC7411");
        assert_eq!(vehicle.to_string(), "Dzire (Car • Petrol) [RJ09CC7411]");
    }

    #[test]
    fn test_starter_fleet() {
        let fleet = Vehicle::starter_fleet();
        assert_eq!(fleet.len(), 3);
        assert_eq!(fleet[2].category, VehicleCategory::Car);
    }
}
