//! FuelTrack Core Library
//!
//! Vehicle, fuel and service records, the metrics derived from them, and the
//! store and sync machinery shared by FuelTrack applications.

pub mod cache;
pub mod forms;
pub mod identity;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod store;
pub mod sync;

pub use cache::{CacheError, LocalCache, MemoryCache};
pub use forms::{FuelEntryForm, ServiceEntryForm, ValidationError, VehicleForm};
pub use identity::{Identity, IdentityError, IdentityProvider, MemoryIdentityProvider};
pub use metrics::{FuelHistoryRow, TripEfficiency, VehicleSummary};
pub use models::{
    FuelEntry, FuelType, PaymentMode, ServiceEntry, Vehicle, VehicleCategory, GUEST_OWNER,
};
pub use notify::{Notification, NotificationLevel, Notifier};
pub use store::{Collection, Entry, Record, RecordStore, Records, SessionTicket, StoreError};
pub use sync::{
    MemoryRemoteStore, MigrationReport, RemoteError, RemoteStore, SnapshotSink, Subscription,
    SyncCoordinator, SyncState,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
