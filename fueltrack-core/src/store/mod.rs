//! In-memory record collections with optimistic writes.
//!
//! Mutations land in memory first. When someone is signed in the same write
//! is then forwarded to the remote store; otherwise the affected collection is
//! written to the local cache so guest data survives a restart. A failed
//! remote write is logged and notified but never rolled back.
//!
//! Remote snapshots replace a collection wholesale. They are only accepted for
//! the session they were opened under, and only after guest records have been
//! migrated to the signed-in owner. Guest records a migration pass could not
//! move are kept in memory and in the local cache until a later pass moves
//! them.

mod record;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::LocalCache;
use crate::identity::Identity;
use crate::models::{new_record_id, FuelEntry, ServiceEntry, Vehicle, GUEST_OWNER};
use crate::notify::Notifier;
use crate::sync::RemoteStore;

pub use record::{Collection, Entry, Record, Records};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("No {} with id '{id}'", .collection.noun())]
    NotFound { collection: Collection, id: String },
}

/// Identifies the session a subscription was opened under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub epoch: u64,
    pub owner_id: String,
}

#[derive(Debug, Default)]
struct State {
    records: Records,
    identity: Option<Identity>,
    epoch: u64,
    migration_complete: bool,
}

impl State {
    fn owner_id(&self) -> String {
        self.identity
            .as_ref()
            .map(|i| i.uid.clone())
            .unwrap_or_else(|| GUEST_OWNER.to_string())
    }

    fn accepts(&self, ticket: &SessionTicket) -> bool {
        self.migration_complete
            && self.epoch == ticket.epoch
            && self
                .identity
                .as_ref()
                .is_some_and(|i| i.uid == ticket.owner_id)
    }
}

enum Change<'a, R> {
    Upsert(&'a R),
    Delete(&'a str),
}

pub struct RecordStore {
    state: Mutex<State>,
    cache: Arc<dyn LocalCache>,
    remote: Option<Arc<dyn RemoteStore>>,
    notifier: Notifier,
}

impl RecordStore {
    pub fn new(
        cache: Arc<dyn LocalCache>,
        remote: Option<Arc<dyn RemoteStore>>,
        notifier: Notifier,
    ) -> Self {
        Self {
            state: Mutex::new(State::default()),
            cache,
            remote,
            notifier,
        }
    }

    /// Builds a store hydrated from whatever the local cache holds.
    pub async fn load(
        cache: Arc<dyn LocalCache>,
        remote: Option<Arc<dyn RemoteStore>>,
        notifier: Notifier,
    ) -> Self {
        let store = Self::new(cache, remote, notifier);
        let records = store.read_cache().await;
        debug!(records = records.len(), "Loaded records from local cache");
        store.lock().records = records;
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn identity(&self) -> Option<Identity> {
        self.lock().identity.clone()
    }

    /// Owner stamped on new records: the signed-in uid, or `"guest"`.
    pub fn owner_id(&self) -> String {
        self.lock().owner_id()
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn is_migration_complete(&self) -> bool {
        self.lock().migration_complete
    }

    pub fn snapshot(&self) -> Records {
        self.lock().records.clone()
    }

    // Queries

    pub fn vehicles(&self) -> Vec<Vehicle> {
        self.lock().records.vehicles.clone()
    }

    pub fn vehicle(&self, id: &str) -> Option<Vehicle> {
        self.get::<Vehicle>(id)
    }

    /// Looks a vehicle up by id, then by case-insensitive name.
    pub fn find_vehicle(&self, name_or_id: &str) -> Option<Vehicle> {
        let state = self.lock();
        let vehicles = &state.records.vehicles;
        vehicles
            .iter()
            .find(|v| v.id == name_or_id)
            .or_else(|| {
                vehicles
                    .iter()
                    .find(|v| v.name.eq_ignore_ascii_case(name_or_id.trim()))
            })
            .cloned()
    }

    pub fn fuel_entry(&self, id: &str) -> Option<FuelEntry> {
        self.get::<FuelEntry>(id)
    }

    pub fn service_entry(&self, id: &str) -> Option<ServiceEntry> {
        self.get::<ServiceEntry>(id)
    }

    pub fn get<R: Record>(&self, id: &str) -> Option<R> {
        R::slot(&self.lock().records)
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    /// Entries for one vehicle, most recent date first.
    pub fn query_by_vehicle<R: Entry>(&self, vehicle_id: &str) -> Vec<R> {
        let mut entries: Vec<R> = R::slot(&self.lock().records)
            .iter()
            .filter(|e| e.vehicle_id() == vehicle_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.date().cmp(&a.date()).then_with(|| b.id().cmp(a.id())));
        entries
    }

    pub fn fuel_entries_for(&self, vehicle_id: &str) -> Vec<FuelEntry> {
        self.query_by_vehicle(vehicle_id)
    }

    pub fn service_entries_for(&self, vehicle_id: &str) -> Vec<ServiceEntry> {
        self.query_by_vehicle(vehicle_id)
    }

    // Mutations

    /// Stores a new record under a fresh id and returns the id.
    pub async fn add<R: Record>(&self, mut record: R) -> String {
        let id = new_record_id();
        record.set_id(id.clone());

        let signed_in = {
            let mut state = self.lock();
            record.set_owner_id(state.owner_id());
            R::slot_mut(&mut state.records).push(record.clone());
            state.identity.is_some()
        };

        debug!(collection = %R::COLLECTION, id = %id, "Added record");
        self.propagate(Change::Upsert(&record), signed_in).await;
        id
    }

    /// Replaces an existing entry wholesale.
    pub async fn edit<R: Entry>(&self, mut record: R) -> Result<(), StoreError> {
        let (signed_in, was_guest) = {
            let mut state = self.lock();
            let owner = state.owner_id();
            let signed_in = state.identity.is_some();
            let slot = R::slot_mut(&mut state.records);
            let existing = slot
                .iter_mut()
                .find(|r| r.id() == record.id())
                .ok_or_else(|| StoreError::NotFound {
                    collection: R::COLLECTION,
                    id: record.id().to_string(),
                })?;
            let was_guest = existing.owner_id() == GUEST_OWNER;
            record.set_owner_id(owner);
            *existing = record.clone();
            (signed_in, was_guest)
        };

        debug!(collection = %R::COLLECTION, id = %record.id(), "Edited record");
        self.propagate(Change::Upsert(&record), signed_in).await;
        if signed_in && was_guest {
            self.persist_guest_remainder().await;
        }
        Ok(())
    }

    /// Removes an entry. Returns `false` if there was nothing to remove.
    pub async fn delete<R: Entry>(&self, id: &str) -> bool {
        let (signed_in, was_guest) = {
            let mut state = self.lock();
            let signed_in = state.identity.is_some();
            let slot = R::slot_mut(&mut state.records);
            let Some(index) = slot.iter().position(|r| r.id() == id) else {
                return false;
            };
            let removed = slot.remove(index);
            (signed_in, removed.owner_id() == GUEST_OWNER)
        };

        debug!(collection = %R::COLLECTION, id = %id, "Deleted record");
        self.propagate::<R>(Change::Delete(id), signed_in).await;
        if signed_in && was_guest {
            self.persist_guest_remainder().await;
        }
        true
    }

    /// Backfills the registration number of an existing vehicle.
    pub async fn set_registration_number(
        &self,
        vehicle_id: &str,
        number: Option<String>,
    ) -> Result<Vehicle, StoreError> {
        let (vehicle, signed_in, was_guest) = {
            let mut state = self.lock();
            let owner = state.owner_id();
            let signed_in = state.identity.is_some();
            let vehicle = state
                .records
                .vehicles
                .iter_mut()
                .find(|v| v.id == vehicle_id)
                .ok_or_else(|| StoreError::NotFound {
                    collection: Collection::Vehicles,
                    id: vehicle_id.to_string(),
                })?;
            let was_guest = vehicle.owner_id == GUEST_OWNER;
            vehicle.registration_number = number
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty());
            vehicle.owner_id = owner;
            (vehicle.clone(), signed_in, was_guest)
        };

        self.propagate(Change::Upsert(&vehicle), signed_in).await;
        if signed_in && was_guest {
            self.persist_guest_remainder().await;
        }
        Ok(vehicle)
    }

    async fn propagate<R: Record>(&self, change: Change<'_, R>, signed_in: bool) {
        if !signed_in {
            self.persist_guest::<R>().await;
            return;
        }
        let Some(remote) = &self.remote else {
            return;
        };

        let result = match change {
            Change::Upsert(record) => match serde_json::to_value(record) {
                Ok(document) => remote.upsert(R::COLLECTION, record.id(), document).await,
                Err(e) => Err(e.into()),
            },
            Change::Delete(id) => remote.delete(R::COLLECTION, id).await,
        };

        if let Err(e) = result {
            warn!(collection = %R::COLLECTION, error = %e, "Remote write failed");
            self.notifier
                .error(format!("Failed to save {}: {}", R::COLLECTION.noun(), e));
        }
    }

    // Guest cache

    async fn persist_guest<R: Record>(&self) {
        let encoded = {
            let state = self.lock();
            serde_json::to_string(R::slot(&state.records))
        };
        self.write_collection::<R>(encoded).await;
    }

    async fn write_collection<R: Record>(&self, encoded: serde_json::Result<String>) {
        let result = match encoded {
            Ok(json) => self.cache.set(R::COLLECTION.name(), &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(collection = %R::COLLECTION, error = %e, "Failed to write local cache");
        }
    }

    /// Rewrites the local cache to hold only records still owned by the
    /// guest, clearing it once nothing is left to migrate.
    pub async fn persist_guest_remainder(&self) {
        let remainder = self.lock().records.guest_only();
        if remainder.is_empty() {
            if let Err(e) = self.cache.clear().await {
                warn!(error = %e, "Failed to clear local cache");
            }
            return;
        }

        debug!(records = remainder.len(), "Keeping unmigrated guest records in local cache");
        self.write_collection::<Vehicle>(serde_json::to_string(&remainder.vehicles))
            .await;
        self.write_collection::<FuelEntry>(serde_json::to_string(&remainder.fuel_entries))
            .await;
        self.write_collection::<ServiceEntry>(serde_json::to_string(
            &remainder.service_entries,
        ))
        .await;
    }

    async fn read_collection<R: Record>(&self) -> Vec<R> {
        let key = R::COLLECTION.name();
        let raw = match self.cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(collection = key, error = %e, "Failed to read local cache");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(collection = key, error = %e, "Discarding unreadable cached collection");
            Vec::new()
        })
    }

    async fn read_cache(&self) -> Records {
        Records {
            vehicles: self.read_collection().await,
            fuel_entries: self.read_collection().await,
            service_entries: self.read_collection().await,
        }
    }

    // Session lifecycle

    /// Starts a signed-in session. Snapshots are refused until
    /// [`mark_migration_complete`](Self::mark_migration_complete) is called
    /// with the returned ticket.
    ///
    /// The local cache keeps its guest records; a migration pass trims it via
    /// [`persist_guest_remainder`](Self::persist_guest_remainder).
    pub fn begin_session(&self, identity: Identity) -> SessionTicket {
        let mut state = self.lock();
        state.epoch += 1;
        state.migration_complete = false;
        let ticket = SessionTicket {
            epoch: state.epoch,
            owner_id: identity.uid.clone(),
        };
        state.identity = Some(identity);
        ticket
    }

    /// Ends the session and falls back to the cached guest records.
    pub async fn end_session(&self) {
        {
            let mut state = self.lock();
            state.epoch += 1;
            state.identity = None;
            state.migration_complete = false;
        }

        let cached = self.read_cache().await.guest_only();
        self.lock().records = cached;
    }

    /// Invalidates open subscriptions without signing out.
    pub fn retire_epoch(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.migration_complete = false;
    }

    /// Runs `f` under the store lock if `ticket` is still current, so nothing
    /// can end the session in between.
    pub fn with_current_session(&self, ticket: &SessionTicket, f: impl FnOnce()) -> bool {
        let state = self.lock();
        if !state.accepts(ticket) {
            return false;
        }
        f();
        true
    }

    pub fn mark_migration_complete(&self, ticket: &SessionTicket) -> bool {
        let mut state = self.lock();
        if state.epoch != ticket.epoch {
            return false;
        }
        state.migration_complete = true;
        true
    }

    /// Guest-owned records of one collection.
    pub fn guest_records<R: Record>(&self) -> Vec<R> {
        R::slot(&self.lock().records)
            .iter()
            .filter(|r| r.owner_id() == GUEST_OWNER)
            .cloned()
            .collect()
    }

    /// Moves a guest record to `owner_id` locally, once its remote copy has
    /// been written. Does nothing if `owner_id` is no longer signed in.
    pub fn adopt<R: Record>(&self, id: &str, owner_id: &str) -> bool {
        let mut state = self.lock();
        if !state
            .identity
            .as_ref()
            .is_some_and(|i| i.uid == owner_id)
        {
            return false;
        }
        match R::slot_mut(&mut state.records)
            .iter_mut()
            .find(|r| r.id() == id && r.owner_id() == GUEST_OWNER)
        {
            Some(record) => {
                record.set_owner_id(owner_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Replaces a collection with a remote snapshot. Local guest records the
    /// snapshot does not contain are kept. Returns `false` and leaves state
    /// untouched when the ticket is stale.
    pub fn apply_snapshot<R: Record>(&self, ticket: &SessionTicket, records: Vec<R>) -> bool {
        let mut state = self.lock();
        if !state.accepts(ticket) {
            debug!(collection = %R::COLLECTION, epoch = ticket.epoch, "Dropping stale snapshot");
            return false;
        }
        let mut records: Vec<R> = records
            .into_iter()
            .filter(|r| r.owner_id() == ticket.owner_id)
            .collect();
        let unmigrated: Vec<R> = R::slot(&state.records)
            .iter()
            .filter(|r| r.owner_id() == GUEST_OWNER && !records.iter().any(|m| m.id() == r.id()))
            .cloned()
            .collect();
        debug!(
            collection = %R::COLLECTION,
            count = records.len(),
            unmigrated = unmigrated.len(),
            "Applied snapshot"
        );
        records.extend(unmigrated);
        *R::slot_mut(&mut state.records) = records;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::{FuelType, PaymentMode, VehicleCategory};
    use crate::notify::NotificationLevel;
    use crate::sync::MemoryRemoteStore;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fill(vehicle_id: &str, day: NaiveDate, odometer: f64) -> FuelEntry {
        FuelEntry::new(vehicle_id, day, odometer, 5.0, 100.0, 500.0)
    }

    fn guest_store() -> (RecordStore, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let store = RecordStore::new(cache.clone(), None, Notifier::new());
        (store, cache)
    }

    fn remote_store() -> (RecordStore, Arc<MemoryRemoteStore>) {
        let remote = Arc::new(MemoryRemoteStore::new());
        let store = RecordStore::new(
            Arc::new(MemoryCache::new()),
            Some(remote.clone()),
            Notifier::new(),
        );
        (store, remote)
    }

    #[tokio::test]
    async fn test_add_then_query_keeps_fields() {
        let (store, _) = guest_store();
        let entry = FuelEntry::new("v1", date(2025, 3, 1), 12000.0, 6.5, 104.2, 677.3);
        let submitted_id = entry.id.clone();

        let id = store.add(entry.clone()).await;
        assert_ne!(id, submitted_id);

        let found: Vec<FuelEntry> = store.query_by_vehicle("v1");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(found[0].owner_id, GUEST_OWNER);
        assert_eq!(found[0].odometer, 12000.0);
        assert_eq!(found[0].liters, 6.5);
        assert_eq!(found[0].price, 104.2);
        assert_eq!(found[0].total_cost, 677.3);
        assert_eq!(found[0].date, date(2025, 3, 1));
    }

    #[tokio::test]
    async fn test_query_by_vehicle_sorted_desc_and_scoped() {
        let (store, _) = guest_store();
        store.add(fill("v1", date(2025, 1, 1), 100.0)).await;
        store.add(fill("v1", date(2025, 3, 1), 300.0)).await;
        store.add(fill("v1", date(2025, 2, 1), 200.0)).await;
        store.add(fill("v2", date(2025, 4, 1), 50.0)).await;

        let dates: Vec<NaiveDate> = store
            .fuel_entries_for("v1")
            .into_iter()
            .map(|e| e.date)
            .collect();
        assert_eq!(
            dates,
            vec![date(2025, 3, 1), date(2025, 2, 1), date(2025, 1, 1)]
        );
        assert!(store.fuel_entries_for("missing").is_empty());
    }

    #[tokio::test]
    async fn test_edit_replaces_record() {
        let (store, _) = guest_store();
        let id = store.add(fill("v1", date(2025, 1, 1), 100.0)).await;

        let mut changed = store.fuel_entry(&id).unwrap();
        changed.liters = 9.0;
        changed.total_cost = 900.0;
        store.edit(changed).await.unwrap();

        let stored = store.fuel_entry(&id).unwrap();
        assert_eq!(stored.liters, 9.0);
        assert_eq!(stored.total_cost, 900.0);
        assert_eq!(store.fuel_entries_for("v1").len(), 1);
    }

    #[tokio::test]
    async fn test_edit_unknown_id_is_not_found() {
        let (store, _) = guest_store();
        let entry = ServiceEntry::new("v1", date(2025, 1, 1), 100.0, "Oil", 450.0);
        let id = entry.id.clone();

        let err = store.edit(entry).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound {
                collection: Collection::ServiceEntries,
                id
            }
        );
        assert!(err.to_string().starts_with("No service entry"));
    }

    #[tokio::test]
    async fn test_delete_is_noop_for_unknown_id() {
        let (store, _) = guest_store();
        let id = store
            .add(ServiceEntry::new("v1", date(2025, 1, 1), 100.0, "Oil", 450.0))
            .await;

        assert!(!store.delete::<ServiceEntry>("nope").await);
        assert!(store.delete::<ServiceEntry>(&id).await);
        assert!(store.service_entries_for("v1").is_empty());
    }

    #[tokio::test]
    async fn test_guest_changes_persist_to_cache() {
        let (store, cache) = guest_store();
        store
            .add(Vehicle::new("Dzire", VehicleCategory::Car, FuelType::Petrol))
            .await;
        let id = store.add(fill("v1", date(2025, 1, 1), 100.0)).await;
        store
            .add(
                ServiceEntry::new("v1", date(2025, 1, 2), 110.0, "Wash", 0.0)
                    .with_payment_mode(PaymentMode::Online),
            )
            .await;

        let reloaded = RecordStore::load(cache.clone(), None, Notifier::new()).await;
        assert_eq!(reloaded.snapshot(), store.snapshot());

        store.delete::<FuelEntry>(&id).await;
        let reloaded = RecordStore::load(cache, None, Notifier::new()).await;
        assert!(reloaded.fuel_entries_for("v1").is_empty());
        assert_eq!(reloaded.vehicles().len(), 1);
    }

    #[tokio::test]
    async fn test_set_registration_number() {
        let (store, cache) = guest_store();
        let id = store
            .add(Vehicle::new("Activa 5G", VehicleCategory::Scooty, FuelType::Petrol))
            .await;

        let vehicle = store
            .set_registration_number(&id, Some(" RJ09CC7411 ".into()))
            .await
            .unwrap();
        assert_eq!(vehicle.registration_number.as_deref(), Some("RJ09CC7411"));

        let reloaded = RecordStore::load(cache, None, Notifier::new()).await;
        assert_eq!(
            reloaded.vehicle(&id).unwrap().registration_number.as_deref(),
            Some("RJ09CC7411")
        );

        assert!(store
            .set_registration_number("missing", Some("X".into()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_find_vehicle_by_id_or_name() {
        let (store, _) = guest_store();
        let id = store
            .add(Vehicle::new("Yamaha FZ", VehicleCategory::Bike, FuelType::Petrol))
            .await;

        assert_eq!(store.find_vehicle(&id).unwrap().id, id);
        assert_eq!(store.find_vehicle("yamaha fz").unwrap().id, id);
        assert!(store.find_vehicle("Dzire").is_none());
    }

    #[tokio::test]
    async fn test_signed_in_writes_go_to_remote() {
        let (store, remote) = remote_store();
        store
            .begin_session(Identity::new("u1", "u1@example.com"));

        let id = store.add(fill("v1", date(2025, 1, 1), 100.0)).await;
        assert_eq!(store.fuel_entry(&id).unwrap().owner_id, "u1");

        let doc = remote.document(Collection::FuelEntries, &id).unwrap();
        assert_eq!(doc["ownerId"], "u1");
        assert_eq!(doc["vehicleId"], "v1");

        store.delete::<FuelEntry>(&id).await;
        assert!(remote.document(Collection::FuelEntries, &id).is_none());
    }

    #[tokio::test]
    async fn test_failed_remote_write_keeps_local_and_notifies() {
        let (store, remote) = remote_store();
        let mut notifications = store.notifier().subscribe();
        store
            .begin_session(Identity::new("u1", "u1@example.com"));
        remote.set_fail_writes(true);

        let id = store.add(fill("v1", date(2025, 1, 1), 100.0)).await;

        assert!(store.fuel_entry(&id).is_some());
        assert!(remote.document(Collection::FuelEntries, &id).is_none());
        let note = notifications.recv().await.unwrap();
        assert_eq!(note.level, NotificationLevel::Error);
        assert!(note.message.contains("fuel entry"));
    }

    #[tokio::test]
    async fn test_snapshot_gated_on_migration_and_epoch() {
        let (store, _) = remote_store();
        let ticket = store
            .begin_session(Identity::new("u1", "u1@example.com"));

        let mut remote_entry = fill("v1", date(2025, 1, 1), 100.0);
        remote_entry.owner_id = "u1".into();

        assert!(!store.apply_snapshot(&ticket, vec![remote_entry.clone()]));
        assert!(store.fuel_entries_for("v1").is_empty());

        assert!(store.mark_migration_complete(&ticket));
        assert!(store.apply_snapshot(&ticket, vec![remote_entry.clone()]));
        assert_eq!(store.fuel_entries_for("v1").len(), 1);

        store.end_session().await;
        assert!(!store.apply_snapshot(&ticket, vec![remote_entry.clone(), remote_entry]));
        assert!(store.fuel_entries_for("v1").is_empty());
        assert_eq!(store.owner_id(), GUEST_OWNER);
    }

    #[tokio::test]
    async fn test_snapshot_drops_foreign_owner() {
        let (store, _) = remote_store();
        let ticket = store
            .begin_session(Identity::new("u1", "u1@example.com"));
        store.mark_migration_complete(&ticket);

        let mut mine = fill("v1", date(2025, 1, 1), 100.0);
        mine.owner_id = "u1".into();
        let mut theirs = fill("v1", date(2025, 1, 2), 200.0);
        theirs.owner_id = "u2".into();

        assert!(store.apply_snapshot(&ticket, vec![mine.clone(), theirs]));
        assert_eq!(store.fuel_entries_for("v1"), vec![mine]);
    }

    #[tokio::test]
    async fn test_end_session_reverts_to_guest_cache() {
        let (store, remote) = remote_store();
        store.add(fill("v1", date(2025, 1, 1), 100.0)).await;

        let ticket = store
            .begin_session(Identity::new("u1", "u1@example.com"));
        store.mark_migration_complete(&ticket);
        store.add(fill("v1", date(2025, 2, 1), 200.0)).await;
        assert_eq!(remote.len(Collection::FuelEntries), 1);

        store.end_session().await;
        // The unmigrated guest fill is still cached; the signed-in one is not.
        let records = store.snapshot();
        assert_eq!(records.fuel_entries.len(), 1);
        assert_eq!(records.fuel_entries[0].odometer, 100.0);
        assert_eq!(records.count_owned_by(GUEST_OWNER), 1);
        assert!(store.identity().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_keeps_unmigrated_guest_records() {
        let (store, _) = remote_store();
        let guest_id = store.add(fill("v1", date(2025, 1, 1), 100.0)).await;

        let ticket = store.begin_session(Identity::new("u1", "u1@example.com"));
        store.mark_migration_complete(&ticket);

        let mut mine = fill("v1", date(2025, 2, 1), 200.0);
        mine.owner_id = "u1".into();
        assert!(store.apply_snapshot(&ticket, vec![mine.clone()]));
        assert!(store.apply_snapshot(&ticket, vec![mine.clone()]));

        let entries = store.fuel_entries_for("v1");
        assert_eq!(entries.len(), 2);
        assert_eq!(store.guest_records::<FuelEntry>()[0].id, guest_id);

        // Once the remote holds the record under the new owner, the guest
        // copy gives way.
        let mut moved = store.fuel_entry(&guest_id).unwrap();
        moved.owner_id = "u1".into();
        assert!(store.apply_snapshot(&ticket, vec![mine, moved]));
        assert!(store.guest_records::<FuelEntry>().is_empty());
        assert_eq!(store.fuel_entries_for("v1").len(), 2);
    }

    #[tokio::test]
    async fn test_guest_remainder_survives_restart() {
        let cache = Arc::new(MemoryCache::new());
        let store = RecordStore::new(cache.clone(), None, Notifier::new());
        let moved = store.add(fill("v1", date(2025, 1, 1), 100.0)).await;
        let stuck = store.add(fill("v1", date(2025, 2, 1), 200.0)).await;

        store.begin_session(Identity::new("u1", "u1@example.com"));
        assert!(store.adopt::<FuelEntry>(&moved, "u1"));
        store.persist_guest_remainder().await;

        let reloaded = RecordStore::load(cache.clone(), None, Notifier::new()).await;
        let ids: Vec<String> = reloaded
            .snapshot()
            .fuel_entries
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![stuck.clone()]);

        assert!(store.adopt::<FuelEntry>(&stuck, "u1"));
        store.persist_guest_remainder().await;
        let reloaded = RecordStore::load(cache, None, Notifier::new()).await;
        assert!(reloaded.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_edit_of_guest_record_while_signed_in_leaves_cache() {
        let cache = Arc::new(MemoryCache::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let store = RecordStore::new(cache.clone(), Some(remote.clone()), Notifier::new());
        let id = store.add(fill("v1", date(2025, 1, 1), 100.0)).await;

        store.begin_session(Identity::new("u1", "u1@example.com"));
        let mut edited = store.fuel_entry(&id).unwrap();
        edited.liters = 7.0;
        store.edit(edited).await.unwrap();

        assert_eq!(remote.document(Collection::FuelEntries, &id).unwrap()["ownerId"], "u1");
        let reloaded = RecordStore::load(cache, None, Notifier::new()).await;
        assert!(reloaded.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_with_current_session_refuses_stale_ticket() {
        let (store, _) = remote_store();
        let ticket = store.begin_session(Identity::new("u1", "u1@example.com"));
        store.mark_migration_complete(&ticket);

        let mut ran = false;
        assert!(store.with_current_session(&ticket, || ran = true));
        assert!(ran);

        store.retire_epoch();
        let mut ran_again = false;
        assert!(!store.with_current_session(&ticket, || ran_again = true));
        assert!(!ran_again);
    }

    #[tokio::test]
    async fn test_adopt_requires_current_owner() {
        let (store, _) = remote_store();
        let id = store.add(fill("v1", date(2025, 1, 1), 100.0)).await;

        assert!(!store.adopt::<FuelEntry>(&id, "u1"));

        store
            .begin_session(Identity::new("u1", "u1@example.com"));
        assert!(!store.adopt::<FuelEntry>(&id, "u2"));
        assert!(store.adopt::<FuelEntry>(&id, "u1"));
        assert!(!store.adopt::<FuelEntry>(&id, "u1"));
        assert!(store.guest_records::<FuelEntry>().is_empty());
    }
}
