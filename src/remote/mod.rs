//! HTTP clients for the FuelTrack sync server.

pub mod auth;
pub mod client;

pub use auth::{HttpIdentityProvider, Session, SessionError};
pub use client::HttpRemoteStore;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::server::{init_server_db, router, AppState, ServerConfig};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    /// Serves a fresh sync server on an ephemeral port. Returns its base URL.
    pub async fn spawn_server() -> (String, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_server_db(&temp_dir.path().join("server.db"))
            .await
            .unwrap();
        let app = router(AppState::new(pool, &ServerConfig::default()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), temp_dir)
    }

    /// Creates an account and returns `(token, uid)`.
    pub async fn signup(base_url: &str, email: &str) -> (String, String) {
        let body: Value = reqwest::Client::new()
            .post(format!("{}/auth/signup", base_url))
            .json(&json!({"email": email, "password": "secret123"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        (
            body["token"].as_str().unwrap().to_string(),
            body["uid"].as_str().unwrap().to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::spawn_server;
    use super::*;
    use fueltrack_core::{
        FuelEntry, IdentityProvider, MemoryCache, Notifier, RecordStore, RemoteStore,
        SyncCoordinator, SyncState, Vehicle, VehicleCategory, FuelType, GUEST_OWNER,
    };
    use chrono::NaiveDate;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(5);
    const FAST: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_guest_records_reach_the_server_after_sign_in() {
        let (url, _server_dir) = spawn_server().await;
        let temp_dir = TempDir::new().unwrap();

        // Guest session: no remote yet
        let cache = Arc::new(MemoryCache::new());
        let guest_store = RecordStore::load(cache.clone(), None, Notifier::new()).await;
        let vehicle_id = guest_store
            .add(Vehicle::new("Activa", VehicleCategory::Scooty, FuelType::Petrol))
            .await;
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        guest_store
            .add(FuelEntry::new(&vehicle_id, day, 1000.0, 4.0, 100.0, 400.0))
            .await;
        guest_store
            .add(FuelEntry::new(&vehicle_id, day, 1150.0, 3.0, 100.0, 300.0))
            .await;

        // Sign up, then reopen with the remote wired in
        let provider =
            HttpIdentityProvider::new(&url, temp_dir.path().join("session.yaml"), TIMEOUT)
                .unwrap();
        let identity = provider
            .sign_up("rider@example.com", "secret123", None)
            .await
            .unwrap();
        let remote: Arc<dyn RemoteStore> = Arc::new(
            HttpRemoteStore::new(&url, provider.token().unwrap(), TIMEOUT, FAST).unwrap(),
        );
        let store = Arc::new(
            RecordStore::load(cache, Some(remote.clone()), Notifier::new()).await,
        );
        let coordinator = SyncCoordinator::new(store.clone(), Some(remote.clone()));

        coordinator.handle_identity(Some(identity.clone())).await;
        assert!(coordinator.wait_until_synced(TIMEOUT).await);
        assert_eq!(coordinator.status(), SyncState::Synced);

        let entries = store.fuel_entries_for(&vehicle_id);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.owner_id == identity.uid));
        assert!(store
            .snapshot()
            .fuel_entries
            .iter()
            .all(|e| e.owner_id != GUEST_OWNER));

        // The server holds the migrated records
        let mut sub = remote
            .subscribe(fueltrack_core::Collection::FuelEntries, &identity.uid)
            .await
            .unwrap();
        let docs = tokio::time::timeout(TIMEOUT, sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(docs.len(), 2);

        coordinator.shutdown().await;
        assert_eq!(coordinator.status(), SyncState::Offline);
    }
}
