//! Remote store seam and the coordinator that keeps local records in step
//! with it.

mod coordinator;
mod memory;
mod remote;

pub use coordinator::{CollectionMigration, MigrationReport, SyncCoordinator, SyncState};
pub use memory::MemoryRemoteStore;
pub use remote::{
    RemoteError, RemoteStore, Snapshot, SnapshotSink, Subscription, SUBSCRIPTION_BUFFER,
};
