//! Sync CLI commands for synchronizing with the server.

use clap::{Args, Subcommand};
use fueltrack_core::{IdentityProvider, SyncState};

use crate::app::App;
use fueltrack::config::Config;

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and server status
    Status,
}

impl SyncCommand {
    pub async fn run(&self, app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(app, config),
            Some(SyncSubcommand::Status) => self.status(app, config),
        }
    }

    fn sync(&self, app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        if !config.sync.is_configured() {
            return Err(
                "Sync not configured. Set sync.server_url in config or FUELTRACK_SYNC_URL.".into(),
            );
        }
        if !app.is_signed_in() {
            return Err("Not signed in. Run `fueltrack auth login <email>` first.".into());
        }

        // App::open has already run the coordinator to Synced or timed out
        let status = app.coordinator.status();
        let records = app.store.snapshot();
        println!("  ✓ {} vehicle(s)", records.vehicles.len());
        println!("  ✓ {} fill-up(s)", records.fuel_entries.len());
        println!("  ✓ {} service(s)", records.service_entries.len());
        println!();

        if status == SyncState::Synced {
            println!("Sync complete.");
            Ok(())
        } else {
            Err(format!("Sync incomplete (status: {})", status).into())
        }
    }

    fn status(&self, app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let Some(url) = &config.sync.server_url else {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"http://localhost:8080\"");
            println!();
            println!("Or set environment variables:");
            println!("  FUELTRACK_SYNC_URL=http://localhost:8080");
            return Ok(());
        };

        println!("Server:        {}", url);
        println!("Poll interval: {}s", config.sync.poll_interval().as_secs());
        match app.provider.as_ref().and_then(|p| p.current()) {
            Some(identity) => println!("Account:       {}", identity.label()),
            None => println!("Account:       not signed in"),
        }
        println!("Status:        {}", app.coordinator.status());
        Ok(())
    }
}
