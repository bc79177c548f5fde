//! Reconciles local records with the signed-in user's remote collections.
//!
//! On sign-in the coordinator first migrates guest-owned records to the new
//! owner, then opens one subscription per collection. Snapshots are applied
//! through the record store, which refuses anything from a session that has
//! since ended. A subscription that cannot be opened, or that ends while its
//! session is still current, is retried with a growing delay.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::remote::{RemoteStore, Snapshot};
use crate::identity::Identity;
use crate::models::{FuelEntry, ServiceEntry, Vehicle};
use crate::store::{Collection, Record, RecordStore, SessionTicket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Offline,
    Migrating,
    Syncing,
    Synced,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Offline => write!(f, "offline"),
            SyncState::Migrating => write!(f, "migrating"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Synced => write!(f, "synced"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionMigration {
    pub migrated: usize,
    pub failed: usize,
}

/// Outcome of one migration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub vehicles: CollectionMigration,
    pub fuel_entries: CollectionMigration,
    pub service_entries: CollectionMigration,
}

impl MigrationReport {
    pub fn migrated(&self) -> usize {
        self.vehicles.migrated + self.fuel_entries.migrated + self.service_entries.migrated
    }

    pub fn failed(&self) -> usize {
        self.vehicles.failed + self.fuel_entries.failed + self.service_entries.failed
    }
}

struct ActiveSession {
    owner_id: String,
    pumps: Vec<JoinHandle<()>>,
}

impl ActiveSession {
    fn abort(self) {
        for pump in self.pumps {
            pump.abort();
        }
    }
}

pub struct SyncCoordinator {
    store: Arc<RecordStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    state: Arc<watch::Sender<SyncState>>,
    session: Mutex<Option<ActiveSession>>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<RecordStore>, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        let (state, _) = watch::channel(SyncState::Offline);
        Self {
            store,
            remote,
            state: Arc::new(state),
            session: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn status(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SyncState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Sync state changed");
        }
    }

    /// Reacts to a sign-in or sign-out. Repeating the current identity is a
    /// no-op.
    pub async fn handle_identity(&self, identity: Option<Identity>) {
        let mut session = self.session.lock().await;

        let unchanged = match (&*session, &identity) {
            (Some(active), Some(next)) => active.owner_id == next.uid,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(active) = session.take() {
            info!(owner = %active.owner_id, "Tearing down sync session");
            active.abort();
            self.store.end_session().await;
            self.set_state(SyncState::Offline);
        }

        let Some(identity) = identity else {
            return;
        };
        let Some(remote) = self.remote.clone() else {
            warn!("Signed in but no sync server is configured; staying offline");
            return;
        };

        let owner_id = identity.uid.clone();
        let ticket = self.store.begin_session(identity);
        self.set_state(SyncState::Migrating);

        let report = self.migrate_guest_records(&owner_id).await;
        if report.migrated() > 0 || report.failed() > 0 {
            info!(
                migrated = report.migrated(),
                failed = report.failed(),
                "Guest records migrated"
            );
        }
        if report.migrated() > 0 {
            self.store.notifier().success(format!(
                "Moved {} offline record(s) to your account",
                report.migrated()
            ));
        }

        if !self.store.mark_migration_complete(&ticket) {
            return;
        }
        self.set_state(SyncState::Syncing);

        let pumps = self.open_subscriptions(remote, &ticket);
        *session = Some(ActiveSession { owner_id, pumps });
    }

    /// Follows identity changes until the sender side goes away.
    pub async fn follow(&self, mut identities: watch::Receiver<Option<Identity>>) {
        loop {
            let identity = identities.borrow_and_update().clone();
            self.handle_identity(identity).await;
            if identities.changed().await.is_err() {
                break;
            }
        }
    }

    /// Re-writes every guest-owned record with `owner_id`.
    ///
    /// Each collection is migrated in order; the three collections run
    /// concurrently. A record whose remote write fails stays guest-owned, in
    /// memory and in the local cache, so a later pass retries it.
    pub async fn migrate_guest_records(&self, owner_id: &str) -> MigrationReport {
        let Some(remote) = self.remote.as_deref() else {
            return MigrationReport::default();
        };

        let (vehicles, fuel_entries, service_entries) = futures::join!(
            migrate_collection::<Vehicle>(&self.store, remote, owner_id),
            migrate_collection::<FuelEntry>(&self.store, remote, owner_id),
            migrate_collection::<ServiceEntry>(&self.store, remote, owner_id),
        );
        self.store.persist_guest_remainder().await;

        MigrationReport {
            vehicles,
            fuel_entries,
            service_entries,
        }
    }

    fn open_subscriptions(
        &self,
        remote: Arc<dyn RemoteStore>,
        ticket: &SessionTicket,
    ) -> Vec<JoinHandle<()>> {
        let delivered = Arc::new(AtomicU8::new(0));

        Collection::ALL
            .into_iter()
            .map(|collection| {
                tokio::spawn(pump(
                    collection,
                    Arc::clone(&remote),
                    Arc::clone(&self.store),
                    ticket.clone(),
                    Arc::clone(&self.state),
                    Arc::clone(&delivered),
                ))
            })
            .collect()
    }

    /// Waits for `Synced`. Returns `false` on timeout.
    pub async fn wait_until_synced(&self, timeout: Duration) -> bool {
        let mut status = self.watch_status();
        let synced = matches!(
            tokio::time::timeout(timeout, status.wait_for(|s| *s == SyncState::Synced)).await,
            Ok(Ok(_))
        );
        synced
    }

    /// Stops all subscriptions without touching local records.
    pub async fn shutdown(&self) {
        if let Some(active) = self.session.lock().await.take() {
            active.abort();
        }
        self.store.retire_epoch();
        self.set_state(SyncState::Offline);
    }
}

async fn migrate_collection<R: Record>(
    store: &RecordStore,
    remote: &dyn RemoteStore,
    owner_id: &str,
) -> CollectionMigration {
    let mut outcome = CollectionMigration::default();

    for record in store.guest_records::<R>() {
        let mut moved = record.clone();
        moved.set_owner_id(owner_id.to_string());

        let result = match serde_json::to_value(&moved) {
            Ok(document) => remote.upsert(R::COLLECTION, moved.id(), document).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                store.adopt::<R>(moved.id(), owner_id);
                outcome.migrated += 1;
            }
            Err(e) => {
                warn!(
                    collection = %R::COLLECTION,
                    id = %moved.id(),
                    error = %e,
                    "Migration write failed"
                );
                store.notifier().error(format!(
                    "Failed to move {} to your account: {}",
                    R::COLLECTION.noun(),
                    e
                ));
                outcome.failed += 1;
            }
        }
    }
    outcome
}

fn decode<R: Record>(documents: Snapshot) -> Vec<R> {
    documents
        .into_iter()
        .filter_map(|doc: Value| match serde_json::from_value::<R>(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(collection = %R::COLLECTION, error = %e, "Skipping malformed document");
                None
            }
        })
        .collect()
}

fn apply(
    store: &RecordStore,
    ticket: &SessionTicket,
    collection: Collection,
    docs: Snapshot,
) -> bool {
    match collection {
        Collection::Vehicles => store.apply_snapshot::<Vehicle>(ticket, decode(docs)),
        Collection::FuelEntries => store.apply_snapshot::<FuelEntry>(ticket, decode(docs)),
        Collection::ServiceEntries => store.apply_snapshot::<ServiceEntry>(ticket, decode(docs)),
    }
}

fn collection_bit(collection: Collection) -> u8 {
    match collection {
        Collection::Vehicles => 0b001,
        Collection::FuelEntries => 0b010,
        Collection::ServiceEntries => 0b100,
    }
}

const ALL_DELIVERED: u8 = 0b111;

const RESUBSCRIBE_DELAY: Duration = Duration::from_millis(250);
const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(30);

/// Records a first snapshot for `collection` and publishes `Synced` once all
/// three have arrived. The publish happens under the store lock so a session
/// ending concurrently cannot be followed by a stale `Synced`.
fn mark_delivered(
    store: &RecordStore,
    ticket: &SessionTicket,
    state: &watch::Sender<SyncState>,
    delivered: &AtomicU8,
    collection: Collection,
) -> bool {
    let bit = collection_bit(collection);
    let before = delivered.fetch_or(bit, Ordering::SeqCst);
    if before & bit != 0 || before | bit != ALL_DELIVERED {
        return false;
    }

    let published = store.with_current_session(ticket, || {
        state.send_replace(SyncState::Synced);
    });
    if published {
        info!(owner = %ticket.owner_id, "Sync complete");
    }
    published
}

async fn pump(
    collection: Collection,
    remote: Arc<dyn RemoteStore>,
    store: Arc<RecordStore>,
    ticket: SessionTicket,
    state: Arc<watch::Sender<SyncState>>,
    delivered: Arc<AtomicU8>,
) {
    let mut delay = RESUBSCRIBE_DELAY;
    let mut notified = false;

    while store.epoch() == ticket.epoch {
        match remote.subscribe(collection, &ticket.owner_id).await {
            Ok(mut subscription) => {
                delay = RESUBSCRIBE_DELAY;
                notified = false;

                while let Some(docs) = subscription.next().await {
                    if !apply(&store, &ticket, collection, docs) {
                        subscription.unsubscribe();
                        debug!(collection = %collection, "Subscription pump stopped");
                        return;
                    }
                    mark_delivered(&store, &ticket, &state, &delivered, collection);
                }

                subscription.unsubscribe();
                warn!(collection = %collection, "Subscription ended; reconnecting");
            }
            Err(e) => {
                warn!(
                    collection = %collection,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Failed to subscribe"
                );
                if !notified {
                    store
                        .notifier()
                        .error(format!("Could not sync {}: {}", collection, e));
                    notified = true;
                }
            }
        }

        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(MAX_RESUBSCRIBE_DELAY);
    }

    debug!(collection = %collection, "Subscription pump stopped");
}
