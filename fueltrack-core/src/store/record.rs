use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::{FuelEntry, ServiceEntry, Vehicle, GUEST_OWNER};

/// The three record collections. `name` is the key used both in the local
/// cache and on the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Vehicles,
    FuelEntries,
    ServiceEntries,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Vehicles,
        Collection::FuelEntries,
        Collection::ServiceEntries,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Vehicles => "vehicles",
            Collection::FuelEntries => "entries",
            Collection::ServiceEntries => "serviceEntries",
        }
    }

    /// Singular noun for messages.
    pub fn noun(&self) -> &'static str {
        match self {
            Collection::Vehicles => "vehicle",
            Collection::FuelEntries => "fuel entry",
            Collection::ServiceEntries => "service entry",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| {
                format!(
                    "Invalid collection '{}'. Valid options: vehicles, entries, serviceEntries",
                    s
                )
            })
    }
}

/// All records held by a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Records {
    pub vehicles: Vec<Vehicle>,
    pub fuel_entries: Vec<FuelEntry>,
    pub service_entries: Vec<ServiceEntry>,
}

impl Records {
    pub fn len(&self) -> usize {
        self.vehicles.len() + self.fuel_entries.len() + self.service_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records still owned by the guest placeholder.
    pub fn guest_only(&self) -> Records {
        fn keep<R: Record>(records: &[R]) -> Vec<R> {
            records
                .iter()
                .filter(|r| r.owner_id() == GUEST_OWNER)
                .cloned()
                .collect()
        }

        Records {
            vehicles: keep(&self.vehicles),
            fuel_entries: keep(&self.fuel_entries),
            service_entries: keep(&self.service_entries),
        }
    }

    pub fn count_owned_by(&self, owner_id: &str) -> usize {
        self.vehicles.iter().filter(|r| r.owner_id == owner_id).count()
            + self
                .fuel_entries
                .iter()
                .filter(|r| r.owner_id == owner_id)
                .count()
            + self
                .service_entries
                .iter()
                .filter(|r| r.owner_id == owner_id)
                .count()
    }
}

/// A document that lives in one of the collections.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn owner_id(&self) -> &str;
    fn set_owner_id(&mut self, owner_id: String);

    fn slot(records: &Records) -> &Vec<Self>;
    fn slot_mut(records: &mut Records) -> &mut Vec<Self>;
}

/// A dated record that belongs to a vehicle. Only entries can be edited,
/// deleted and queried per vehicle.
pub trait Entry: Record {
    fn vehicle_id(&self) -> &str;
    fn date(&self) -> NaiveDate;
}

impl Record for Vehicle {
    const COLLECTION: Collection = Collection::Vehicles;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn set_owner_id(&mut self, owner_id: String) {
        self.owner_id = owner_id;
    }

    fn slot(records: &Records) -> &Vec<Self> {
        &records.vehicles
    }

    fn slot_mut(records: &mut Records) -> &mut Vec<Self> {
        &mut records.vehicles
    }
}

impl Record for FuelEntry {
    const COLLECTION: Collection = Collection::FuelEntries;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn set_owner_id(&mut self, owner_id: String) {
        self.owner_id = owner_id;
    }

    fn slot(records: &Records) -> &Vec<Self> {
        &records.fuel_entries
    }

    fn slot_mut(records: &mut Records) -> &mut Vec<Self> {
        &mut records.fuel_entries
    }
}

impl Entry for FuelEntry {
    fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Record for ServiceEntry {
    const COLLECTION: Collection = Collection::ServiceEntries;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn set_owner_id(&mut self, owner_id: String) {
        self.owner_id = owner_id;
    }

    fn slot(records: &Records) -> &Vec<Self> {
        &records.service_entries
    }

    fn slot_mut(records: &mut Records) -> &mut Vec<Self> {
        &mut records.service_entries
    }
}

impl Entry for ServiceEntry {
    fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}
