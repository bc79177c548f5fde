//! Server-side modules for the FuelTrack sync server.

pub mod api;
pub mod storage;
pub mod tokens;
pub mod users;

pub use api::{router, ApiError, AuthUser};
pub use storage::{DocumentStore, ServerStorageError};
pub use tokens::{generate_token, SessionStore};
pub use users::{User, UserStore, UserStoreError};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Directory holding the server database
    pub data_dir: PathBuf,
    /// Whether new accounts can be created
    pub signup_enabled: bool,
    /// Email domains allowed to sign in; `None` allows any
    pub allowed_domains: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("fueltrack-server"),
            signup_enabled: true,
            allowed_domains: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("FUELTRACK_SERVER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let data_dir = std::env::var("FUELTRACK_SERVER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let signup_enabled = std::env::var("FUELTRACK_SIGNUP_ENABLED")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.signup_enabled);

        let allowed_domains = std::env::var("FUELTRACK_ALLOWED_DOMAINS")
            .ok()
            .map(|v| parse_domains(&v))
            .filter(|d| !d.is_empty());

        Self {
            port,
            data_dir,
            signup_enabled,
            allowed_domains,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("fueltrack-server.db")
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn parse_domains(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|d| d.trim().trim_start_matches('@').to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

/// Initialize the server database connection pool and run migrations
pub async fn init_server_db(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations/server").run(&pool).await?;

    Ok(pool)
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub sessions: SessionStore,
    pub documents: DocumentStore,
    pub signup_enabled: bool,
    pub allowed_domains: Option<Arc<Vec<String>>>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &ServerConfig) -> Self {
        Self {
            users: UserStore::new(pool.clone()),
            sessions: SessionStore::new(pool.clone()),
            documents: DocumentStore::new(pool),
            signup_enabled: config.signup_enabled,
            allowed_domains: config.allowed_domains.clone().map(Arc::new),
        }
    }

    /// Whether `email` belongs to an allowed domain.
    pub fn domain_allowed(&self, email: &str) -> bool {
        let Some(domains) = &self.allowed_domains else {
            return true;
        };
        let domain = email.rsplit_once('@').map(|(_, d)| d).unwrap_or_default();
        domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_server_db_creates_tables() {
        let temp_dir = tempdir().unwrap();
        let pool = init_server_db(&temp_dir.path().join("server.db"))
            .await
            .unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(table_names, vec!["documents", "sessions", "users"]);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(" OFF "));
    }

    #[test]
    fn test_parse_domains() {
        assert_eq!(
            parse_domains("example.com, @Fleet.org,,"),
            vec!["example.com".to_string(), "fleet.org".to_string()]
        );
    }

    #[tokio::test]
    async fn test_domain_allowed() {
        let temp_dir = tempdir().unwrap();
        let pool = init_server_db(&temp_dir.path().join("server.db"))
            .await
            .unwrap();

        let open = AppState::new(pool.clone(), &ServerConfig::default());
        assert!(open.domain_allowed("anyone@anywhere.net"));

        let config = ServerConfig {
            allowed_domains: Some(vec!["example.com".to_string()]),
            ..ServerConfig::default()
        };
        let restricted = AppState::new(pool, &config);
        assert!(restricted.domain_allowed("a@Example.com"));
        assert!(!restricted.domain_allowed("a@other.com"));
        assert!(!restricted.domain_allowed("no-at-sign"));
    }
}
