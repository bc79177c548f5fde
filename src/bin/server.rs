//! FuelTrack Sync Server
//!
//! Stores each user's vehicles, fuel entries and service entries as JSON
//! documents so the CLI can sync them across devices.
//!
//! # Configuration
//!
//! Environment variables:
//! - `FUELTRACK_SERVER_PORT`: Port to listen on (default: 8080)
//! - `FUELTRACK_SERVER_DATA_DIR`: Directory for the server database (default: ~/.local/share/fueltrack-server)
//! - `FUELTRACK_SIGNUP_ENABLED`: Allow new accounts (default: true)
//! - `FUELTRACK_ALLOWED_DOMAINS`: Comma-separated email domains allowed to sign in (default: any)
//!
//! See [`fueltrack::server::api`] for the endpoints.

use fueltrack::server::{init_server_db, router, AppState, ServerConfig};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fueltrack_server=info,fueltrack=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ServerConfig::from_env();

    // Ensure data directory exists
    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        tracing::error!("Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "Sign-up {}",
        if config.signup_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    if let Some(domains) = &config.allowed_domains {
        tracing::info!("Allowed domains: {}", domains.join(", "));
    }

    let pool = match init_server_db(&config.database_path()).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to open server database: {}", e);
            std::process::exit(1);
        }
    };

    let app = router(AppState::new(pool, &config));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
