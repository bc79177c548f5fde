mod auth;
mod config_cmd;
mod fuel;
mod service;
mod stats;
mod sync_cmd;
mod vehicle;

pub use auth::AuthCommand;
pub use config_cmd::{ConfigCommand, OutputFormat};
pub use fuel::FuelCommand;
pub use service::ServiceCommand;
pub use stats::StatsCommand;
pub use sync_cmd::SyncCommand;
pub use vehicle::VehicleCommand;

use chrono::NaiveDate;
use fueltrack_core::{RecordStore, Vehicle};
use std::io::{self, Write};

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Finds a vehicle by id or name.
pub(crate) fn resolve_vehicle(store: &RecordStore, name_or_id: &str) -> Result<Vehicle, String> {
    store
        .find_vehicle(name_or_id)
        .ok_or_else(|| format!("Vehicle not found: {}", name_or_id))
}

/// Asks a yes/no question on stdin. Anything but `y` is no.
pub(crate) fn confirm(prompt: &str) -> Result<bool, io::Error> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
