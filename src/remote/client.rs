//! HTTP implementation of the remote document store.
//!
//! Writes are plain `PUT`/`DELETE` requests. A subscription polls
//! `GET /collections/{collection}` and delivers a snapshot on the first poll
//! and whenever the returned document set differs from the last one.

use async_trait::async_trait;
use fueltrack_core::sync::Snapshot;
use fueltrack_core::{Collection, RemoteError, RemoteStore, Subscription};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Error body returned by the sync server.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Remote store backed by the FuelTrack sync server.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
    poll_interval: Duration,
}

impl HttpRemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            poll_interval,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn document_url(&self, collection: Collection, id: &str) -> String {
        format!(
            "{}/collections/{}/{}",
            self.base_url,
            collection.name(),
            urlencoding::encode(id)
        )
    }

    fn collection_url(&self, collection: Collection, owner_id: &str) -> String {
        format!(
            "{}/collections/{}?ownerId={}",
            self.base_url,
            collection.name(),
            urlencoding::encode(owner_id)
        )
    }
}

/// Turns a non-success response into a [`RemoteError`].
async fn error_for(response: reqwest::Response) -> RemoteError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status.to_string(),
    };

    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
        StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        StatusCode::BAD_REQUEST => RemoteError::InvalidDocument(message),
        _ => RemoteError::Server(message),
    }
}

fn network(e: reqwest::Error) -> RemoteError {
    RemoteError::Network(e.to_string())
}

async fn fetch(client: &reqwest::Client, url: &str, token: &str) -> Result<Snapshot, RemoteError> {
    let response = client
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(network)?;

    if !response.status().is_success() {
        return Err(error_for(response).await);
    }

    response.json::<Vec<Value>>().await.map_err(network)
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.document_url(collection, id))
            .bearer_auth(&self.token)
            .json(&document)
            .send()
            .await
            .map_err(network)?;

        if !response.status().is_success() {
            return Err(error_for(response).await);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.document_url(collection, id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(network)?;

        if !response.status().is_success() {
            return Err(error_for(response).await);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: Collection,
        owner_id: &str,
    ) -> Result<Subscription, RemoteError> {
        let url = self.collection_url(collection, owner_id);
        let client = self.client.clone();
        let token = self.token.clone();
        let poll_interval = self.poll_interval;

        // First poll happens here so auth and permission errors reach the caller
        let first = fetch(&client, &url, &token).await?;
        let (subscription, mut sink) = Subscription::channel(collection);

        tokio::spawn(async move {
            if !sink.send(first.clone()).await {
                return;
            }
            let mut last = first;

            let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = sink.closed() => break,
                    _ = ticker.tick() => {
                        match fetch(&client, &url, &token).await {
                            Ok(snapshot) if snapshot != last => {
                                if !sink.send(snapshot.clone()).await {
                                    break;
                                }
                                last = snapshot;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!(collection = %collection, error = %e, "Poll failed");
                            }
                        }
                    }
                }
            }
            tracing::debug!(collection = %collection, "Subscription closed");
        });

        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::test_support::{spawn_server, signup};
    use serde_json::json;

    const FAST: Duration = Duration::from_millis(50);
    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_urls_encode_ids() {
        let store = HttpRemoteStore::new("http://localhost:8080/", "t", TIMEOUT, FAST).unwrap();
        assert_eq!(store.base_url(), "http://localhost:8080");
        assert_eq!(
            store.document_url(Collection::FuelEntries, "a b/c"),
            "http://localhost:8080/collections/entries/a%20b%2Fc"
        );
        assert_eq!(
            store.collection_url(Collection::ServiceEntries, "u1"),
            "http://localhost:8080/collections/serviceEntries?ownerId=u1"
        );
    }

    #[tokio::test]
    async fn test_upsert_then_subscribe() {
        let (url, _dir) = spawn_server().await;
        let (token, uid) = signup(&url, "rider@example.com").await;
        let store = HttpRemoteStore::new(&url, token, TIMEOUT, FAST).unwrap();

        let doc = json!({"id": "v1", "name": "Activa", "ownerId": uid});
        store
            .upsert(Collection::Vehicles, "v1", doc.clone())
            .await
            .unwrap();

        let mut sub = store.subscribe(Collection::Vehicles, &uid).await.unwrap();
        let first = tokio::time::timeout(TIMEOUT, sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, vec![doc]);
    }

    #[tokio::test]
    async fn test_subscription_sees_changes() {
        let (url, _dir) = spawn_server().await;
        let (token, uid) = signup(&url, "rider@example.com").await;
        let store = HttpRemoteStore::new(&url, token, TIMEOUT, FAST).unwrap();

        let mut sub = store.subscribe(Collection::FuelEntries, &uid).await.unwrap();
        let first = tokio::time::timeout(TIMEOUT, sub.next())
            .await
            .unwrap()
            .unwrap();
        assert!(first.is_empty());

        let doc = json!({"id": "e1", "ownerId": uid, "liters": 4.0});
        store
            .upsert(Collection::FuelEntries, "e1", doc.clone())
            .await
            .unwrap();
        let next = tokio::time::timeout(TIMEOUT, sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, vec![doc]);

        store.delete(Collection::FuelEntries, "e1").await.unwrap();
        let after_delete = tokio::time::timeout(TIMEOUT, sub.next())
            .await
            .unwrap()
            .unwrap();
        assert!(after_delete.is_empty());
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let (url, _dir) = spawn_server().await;
        let (token, uid) = signup(&url, "rider@example.com").await;

        let bad = HttpRemoteStore::new(&url, "not-a-token", TIMEOUT, FAST).unwrap();
        assert_eq!(
            bad.subscribe(Collection::Vehicles, &uid).await.unwrap_err(),
            RemoteError::Unauthorized
        );

        let store = HttpRemoteStore::new(&url, token, TIMEOUT, FAST).unwrap();
        let err = store
            .upsert(
                Collection::Vehicles,
                "v1",
                json!({"id": "v1", "ownerId": "someone-else"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::PermissionDenied(_)));

        let err = store
            .subscribe(Collection::Vehicles, "someone-else")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Nothing listens on port 9 locally
        let store =
            HttpRemoteStore::new("http://127.0.0.1:9", "t", Duration::from_secs(1), FAST).unwrap();
        let err = store
            .upsert(Collection::Vehicles, "v1", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));
    }
}
