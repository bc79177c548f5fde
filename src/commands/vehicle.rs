use clap::{Args, Subcommand};
use fueltrack_core::forms::VehicleForm;
use fueltrack_core::Vehicle;

use super::{resolve_vehicle, OutputFormat};
use crate::app::App;

#[derive(Args)]
pub struct VehicleCommand {
    #[command(subcommand)]
    pub command: VehicleSubcommand,
}

#[derive(Subcommand)]
pub enum VehicleSubcommand {
    /// Add a vehicle
    Add {
        /// Display name
        name: String,

        /// Category: bike, car, scooty, auto, bus, truck
        #[arg(long)]
        category: String,

        /// Fuel type: petrol, diesel, cng, electric
        #[arg(long = "fuel")]
        fuel_type: String,

        /// Registration number
        #[arg(long = "number")]
        registration_number: Option<String>,
    },

    /// List vehicles
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Set or clear a vehicle's registration number
    SetNumber {
        /// Vehicle ID or name
        vehicle: String,

        /// Registration number (omit to clear)
        number: Option<String>,
    },

    /// Add the starter vehicles when none exist yet
    Defaults,
}

impl VehicleCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let store = &app.store;

        match &self.command {
            VehicleSubcommand::Add {
                name,
                category,
                fuel_type,
                registration_number,
            } => {
                let vehicle = VehicleForm {
                    name: name.clone(),
                    category: category.clone(),
                    fuel_type: fuel_type.clone(),
                    registration_number: registration_number.clone(),
                }
                .validate()?;

                let id = store.add(vehicle).await;
                let vehicle = store
                    .vehicle(&id)
                    .ok_or_else(|| format!("Vehicle not found: {}", id))?;
                println!("Added vehicle:");
                println!("  {}", vehicle);
                println!("  id: {}", vehicle.id);
                Ok(())
            }

            VehicleSubcommand::List { format } => {
                let vehicles = store.vehicles();

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&vehicles)?);
                    }
                    OutputFormat::Text => {
                        if vehicles.is_empty() {
                            println!("No vehicles found. Try `fueltrack vehicle defaults`.");
                            return Ok(());
                        }
                        print_vehicles(&vehicles);
                    }
                }
                Ok(())
            }

            VehicleSubcommand::SetNumber { vehicle, number } => {
                let vehicle = resolve_vehicle(store, vehicle)?;
                let number = number
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string);

                let updated = store.set_registration_number(&vehicle.id, number).await?;
                println!("Updated vehicle:");
                println!("  {}", updated);
                Ok(())
            }

            VehicleSubcommand::Defaults => {
                if !store.vehicles().is_empty() {
                    println!("Vehicles already exist; nothing added.");
                    return Ok(());
                }
                for vehicle in Vehicle::starter_fleet() {
                    let name = vehicle.name.clone();
                    store.add(vehicle).await;
                    println!("Added {}", name);
                }
                Ok(())
            }
        }
    }
}

fn print_vehicles(vehicles: &[Vehicle]) {
    println!(
        "{:<36}  {:<24}  {:<8}  {:<8}  NUMBER",
        "ID", "NAME", "CATEGORY", "FUEL"
    );
    println!("{}", "-".repeat(96));
    for vehicle in vehicles {
        let name = if vehicle.name.chars().count() > 24 {
            format!("{}...", vehicle.name.chars().take(21).collect::<String>())
        } else {
            vehicle.name.clone()
        };
        println!(
            "{:<36}  {:<24}  {:<8}  {:<8}  {}",
            vehicle.id,
            name,
            vehicle.category.to_string(),
            vehicle.fuel_type.to_string(),
            vehicle.registration_number.as_deref().unwrap_or("-")
        );
    }
    println!("\nTotal: {} vehicle(s)", vehicles.len());
}
