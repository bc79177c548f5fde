//! Wiring for one CLI run.
//!
//! Opens the local cache, restores the stored session, and when signed in
//! brings the record store up to date with the sync server before a command
//! touches it.

use fueltrack_core::{
    IdentityError, IdentityProvider, NotificationLevel, Notification, Notifier, RecordStore,
    RemoteError, RemoteStore, SyncCoordinator, SyncState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use fueltrack::config::Config;
use fueltrack::db::{init_db, SqliteCache};
use fueltrack::remote::{HttpIdentityProvider, HttpRemoteStore};

/// Errors that can occur while opening the application.
#[derive(Debug)]
pub enum AppError {
    /// Local database error
    Database(sqlx::Error),
    /// Identity provider error
    Identity(IdentityError),
    /// Remote store error
    Remote(RemoteError),
    /// Sync server not configured
    NotConfigured,
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Identity(e) => write!(f, "{}", e),
            AppError::Remote(e) => write!(f, "{}", e),
            AppError::NotConfigured => write!(
                f,
                "Sync server not configured. Set sync.server_url in config or FUELTRACK_SYNC_URL."
            ),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        AppError::Identity(e)
    }
}

impl From<RemoteError> for AppError {
    fn from(e: RemoteError) -> Self {
        AppError::Remote(e)
    }
}

/// Builds the identity provider when a sync server is configured.
pub fn identity_provider(config: &Config) -> Result<Option<HttpIdentityProvider>, AppError> {
    let Some(url) = &config.sync.server_url else {
        return Ok(None);
    };
    let provider = HttpIdentityProvider::new(
        url.clone(),
        config.session_path.value.clone(),
        config.sync.request_timeout(),
    )?;
    Ok(Some(provider))
}

pub struct App {
    pub store: Arc<RecordStore>,
    pub coordinator: SyncCoordinator,
    pub provider: Option<HttpIdentityProvider>,
    notifications: broadcast::Receiver<Notification>,
}

impl App {
    /// Opens the local cache and, when a session is stored, syncs with the
    /// server.
    pub async fn open(config: &Config) -> Result<Self, AppError> {
        let pool = init_db(&config.database_path.value).await?;
        let cache = Arc::new(SqliteCache::new(pool));

        let provider = identity_provider(config)?;
        let remote: Option<Arc<dyn RemoteStore>> =
            match (&provider, provider.as_ref().and_then(|p| p.token())) {
                (Some(provider), Some(token)) => Some(Arc::new(HttpRemoteStore::new(
                    provider.base_url(),
                    token,
                    config.sync.request_timeout(),
                    config.sync.poll_interval(),
                )?)),
                _ => None,
            };

        let store = Arc::new(RecordStore::load(cache, remote.clone(), Notifier::new()).await);
        let notifications = store.notifier().subscribe();
        let coordinator = SyncCoordinator::new(Arc::clone(&store), remote);

        let app = Self {
            store,
            coordinator,
            provider,
            notifications,
        };

        if let Some(identity) = app.provider.as_ref().and_then(|p| p.current()) {
            tracing::debug!("Restoring session for {}", identity.email);
            app.coordinator.handle_identity(Some(identity)).await;
            if app.coordinator.status() != SyncState::Offline {
                let wait = sync_wait(config);
                if !app.coordinator.wait_until_synced(wait).await {
                    tracing::warn!(
                        "Sync did not finish within {}s; showing what has arrived",
                        wait.as_secs()
                    );
                }
            }
        }

        Ok(app)
    }

    pub fn is_signed_in(&self) -> bool {
        self.store.identity().is_some()
    }

    /// Stops syncing and prints any notifications raised during the run.
    pub async fn close(mut self) {
        self.coordinator.shutdown().await;
        for notification in self.drain_notifications() {
            match notification.level {
                NotificationLevel::Error => eprintln!("{}", notification),
                _ => println!("{}", notification),
            }
        }
    }

    fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut drained = Vec::new();
        loop {
            match self.notifications.try_recv() {
                Ok(notification) => drained.push(notification),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} notification(s)", skipped);
                }
                Err(_) => break,
            }
        }
        drained
    }
}

/// How long a run waits for the first full snapshot.
fn sync_wait(config: &Config) -> Duration {
    config.sync.request_timeout() + config.sync.poll_interval()
}
