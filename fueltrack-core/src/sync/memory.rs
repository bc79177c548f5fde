//! A remote store that lives in process memory.
//!
//! Subscriptions behave like the real thing: every write to a collection
//! pushes a fresh owner-filtered snapshot to each open subscription on it.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::remote::{RemoteError, RemoteStore, Snapshot, Subscription};
use crate::store::Collection;

type Documents = HashMap<Collection, BTreeMap<String, Value>>;

pub struct MemoryRemoteStore {
    documents: Arc<Mutex<Documents>>,
    changes: broadcast::Sender<Collection>,
    fail_writes: AtomicBool,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(documents: &Mutex<Documents>) -> MutexGuard<'_, Documents> {
    documents.lock().unwrap_or_else(PoisonError::into_inner)
}

fn owned_by(documents: &Mutex<Documents>, collection: Collection, owner_id: &str) -> Snapshot {
    lock(documents)
        .get(&collection)
        .map(|docs| {
            docs.values()
                .filter(|doc| doc.get("ownerId").and_then(Value::as_str) == Some(owner_id))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            documents: Arc::new(Mutex::new(HashMap::new())),
            changes,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every later upsert and delete fail with a network error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn document(&self, collection: Collection, id: &str) -> Option<Value> {
        lock(&self.documents)
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn documents(&self, collection: Collection) -> Vec<Value> {
        lock(&self.documents)
            .get(&collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, collection: Collection) -> usize {
        lock(&self.documents)
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.documents).values().all(BTreeMap::is_empty)
    }

    fn check_writable(&self) -> Result<(), RemoteError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("simulated write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<(), RemoteError> {
        self.check_writable()?;
        lock(&self.documents)
            .entry(collection)
            .or_default()
            .insert(id.to_string(), document);
        let _ = self.changes.send(collection);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        self.check_writable()?;
        let removed = lock(&self.documents)
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            let _ = self.changes.send(collection);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: Collection,
        owner_id: &str,
    ) -> Result<Subscription, RemoteError> {
        let (subscription, mut sink) = Subscription::channel(collection);
        let documents = Arc::clone(&self.documents);
        let mut changes = self.changes.subscribe();
        let owner_id = owner_id.to_string();

        tokio::spawn(async move {
            if !sink
                .send(owned_by(&documents, collection, &owner_id))
                .await
            {
                return;
            }
            loop {
                tokio::select! {
                    _ = sink.closed() => break,
                    change = changes.recv() => match change {
                        Ok(changed) if changed != collection => continue,
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            let snapshot = owned_by(&documents, collection, &owner_id);
                            if !sink.send(snapshot).await {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(collection = %collection, "Memory subscription closed");
        });

        Ok(subscription)
    }
}
