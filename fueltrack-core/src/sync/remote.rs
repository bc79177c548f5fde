//! The remote per-user document store.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::store::Collection;

/// Snapshots buffered per subscription before the producer waits.
pub const SUBSCRIPTION_BUFFER: usize = 8;

/// Every document in a collection owned by the subscriber, as of one moment.
pub type Snapshot = Vec<Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Not signed in to the sync server")]
    Unauthorized,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::InvalidDocument(err.to_string())
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Writes `document` under `id`, replacing any existing document.
    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<(), RemoteError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RemoteError>;

    /// Opens a live view of `owner_id`'s documents in `collection`. The first
    /// snapshot arrives as soon as the store has one.
    async fn subscribe(
        &self,
        collection: Collection,
        owner_id: &str,
    ) -> Result<Subscription, RemoteError>;
}

/// Receiving half of a live query.
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    collection: Collection,
    snapshots: mpsc::Receiver<Snapshot>,
    stop: Option<oneshot::Sender<()>>,
}

/// Producing half of a live query, held by whatever feeds snapshots in.
#[derive(Debug)]
pub struct SnapshotSink {
    snapshots: mpsc::Sender<Snapshot>,
    stop: oneshot::Receiver<()>,
}

impl Subscription {
    pub fn channel(collection: Collection) -> (Subscription, SnapshotSink) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (stop_tx, stop_rx) = oneshot::channel();
        (
            Subscription {
                collection,
                snapshots: rx,
                stop: Some(stop_tx),
            },
            SnapshotSink {
                snapshots: tx,
                stop: stop_rx,
            },
        )
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Next snapshot, or `None` once the producer has stopped.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.snapshots.recv().await
    }

    /// Tells the producer to stop. Snapshots already buffered are discarded.
    pub fn unsubscribe(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.snapshots.close();
    }

    pub fn is_active(&self) -> bool {
        self.stop.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl SnapshotSink {
    /// Delivers a snapshot. Returns `false` once the subscriber is gone.
    pub async fn send(&self, snapshot: Snapshot) -> bool {
        self.snapshots.send(snapshot).await.is_ok()
    }

    /// Resolves when the subscriber unsubscribes or is dropped.
    ///
    /// Must not be awaited again after it has resolved.
    pub async fn closed(&mut self) {
        let _ = (&mut self.stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscription_delivers_in_order() {
        let (mut sub, sink) = Subscription::channel(Collection::FuelEntries);
        assert!(sink.send(vec![json!({"id": "a"})]).await);
        assert!(sink.send(vec![]).await);

        assert_eq!(sub.next().await.unwrap().len(), 1);
        assert_eq!(sub.next().await.unwrap().len(), 0);
        assert_eq!(sub.collection(), Collection::FuelEntries);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_producer() {
        let (mut sub, mut sink) = Subscription::channel(Collection::Vehicles);
        sub.unsubscribe();
        assert!(!sub.is_active());

        sink.closed().await;
        assert!(!sink.send(vec![]).await);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let (sub, mut sink) = Subscription::channel(Collection::Vehicles);
        drop(sub);
        sink.closed().await;
        assert!(!sink.send(vec![]).await);
    }
}
