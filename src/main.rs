use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod commands;

use app::App;
use commands::{
    AuthCommand, ConfigCommand, FuelCommand, ServiceCommand, StatsCommand, SyncCommand,
    VehicleCommand,
};
use fueltrack::config::Config;

#[derive(Parser)]
#[command(name = "fueltrack")]
#[command(version)]
#[command(about = "Track fuel fill-ups, services and running costs of your vehicles", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage vehicles
    Vehicle(VehicleCommand),

    /// Record and review fill-ups
    Fuel(FuelCommand),

    /// Record and review services
    Service(ServiceCommand),

    /// Show mileage and spend
    Stats(StatsCommand),

    /// Sign in or out of the sync server
    Auth(AuthCommand),

    /// Sync with the server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fueltrack=warn,fueltrack_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Auth(cmd)) => {
            cmd.run(&config).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        Some(command) => {
            let app = App::open(&config).await?;
            let result = match command {
                Commands::Vehicle(cmd) => cmd.run(&app).await,
                Commands::Fuel(cmd) => cmd.run(&app).await,
                Commands::Service(cmd) => cmd.run(&app).await,
                Commands::Stats(cmd) => cmd.run(&app).await,
                Commands::Sync(cmd) => cmd.run(&app, &config).await,
                Commands::Auth(_) | Commands::Config(_) => Ok(()),
            };
            app.close().await;
            result?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
