use clap::Args;
use fueltrack_core::metrics::{self, format_display_date, TripEfficiency, VehicleSummary};
use fueltrack_core::{RecordStore, Vehicle};
use serde::Serialize;

use super::{resolve_vehicle, today, OutputFormat};
use crate::app::App;

/// Show vehicle metrics
#[derive(Args)]
pub struct StatsCommand {
    /// Vehicle ID or name (default: all vehicles)
    vehicle: Option<String>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Serialize)]
struct VehicleReport {
    summary: VehicleSummary,
    trips: Vec<TripEfficiency>,
}

fn summarize(store: &RecordStore, vehicle: &Vehicle) -> VehicleSummary {
    VehicleSummary::compute(
        vehicle,
        &store.fuel_entries_for(&vehicle.id),
        &store.service_entries_for(&vehicle.id),
        today(),
    )
}

impl StatsCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let store = &app.store;

        match &self.vehicle {
            Some(vehicle) => {
                let vehicle = resolve_vehicle(store, vehicle)?;
                let report = VehicleReport {
                    summary: summarize(store, &vehicle),
                    trips: metrics::all_trip_efficiencies(&store.fuel_entries_for(&vehicle.id)),
                };

                match self.format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", vehicle);
                        println!("{}", "=".repeat(vehicle.to_string().chars().count()));
                        print_summary(&report.summary);
                        if !report.trips.is_empty() {
                            println!();
                            println!("Trips:");
                            for trip in &report.trips {
                                println!(
                                    "  {}  {:.2} km/L",
                                    format_display_date(Some(trip.date)),
                                    trip.mileage
                                );
                            }
                        }
                    }
                }
            }
            None => {
                let summaries: Vec<VehicleSummary> = store
                    .vehicles()
                    .iter()
                    .map(|v| summarize(store, v))
                    .collect();

                match self.format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&summaries)?);
                    }
                    OutputFormat::Text => {
                        if summaries.is_empty() {
                            println!("No vehicles found");
                            return Ok(());
                        }
                        for (idx, summary) in summaries.iter().enumerate() {
                            if idx > 0 {
                                println!();
                            }
                            println!("{}", summary.name);
                            print_summary(summary);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn print_summary(summary: &VehicleSummary) {
    println!("  Fill-ups:        {}", summary.fill_count);
    println!("  Last mileage:    {:.2} km/L", summary.last_efficiency);
    println!("  Average mileage: {:.2} km/L", summary.average_efficiency);
    println!("  Fuel spend:      {:.2}", summary.fuel_spend);
    println!("  Total spend:     {:.2}", summary.total_spend);
    println!(
        "  Last fill:       {}",
        format_display_date(summary.last_fill)
    );
    match summary.days_since_service {
        Some(days) if summary.service_overdue => {
            println!("  Last service:    {} days ago (service overdue)", days)
        }
        Some(days) => println!("  Last service:    {} days ago", days),
        None => println!("  Last service:    never"),
    }
}
