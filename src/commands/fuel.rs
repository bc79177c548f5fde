use clap::{Args, Subcommand};
use fueltrack_core::forms::FuelEntryForm;
use fueltrack_core::metrics::{self, format_display_date, FuelHistoryRow};
use fueltrack_core::FuelEntry;

use super::{confirm, resolve_vehicle, today, OutputFormat};
use crate::app::App;

#[derive(Args)]
pub struct FuelCommand {
    #[command(subcommand)]
    pub command: FuelSubcommand,
}

#[derive(Subcommand)]
pub enum FuelSubcommand {
    /// Record a fill-up. Give the price or the total; the other is derived.
    Add {
        /// Vehicle ID or name
        vehicle: String,

        /// Odometer reading
        #[arg(long)]
        odometer: String,

        /// Fuel volume
        #[arg(long)]
        liters: String,

        /// Price per unit of fuel
        #[arg(long)]
        price: Option<String>,

        /// Total cost of the fill-up
        #[arg(long = "total")]
        total_cost: Option<String>,

        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Edit a fill-up
    Edit {
        /// Fuel entry ID
        id: String,

        #[arg(long)]
        odometer: Option<String>,

        #[arg(long)]
        liters: Option<String>,

        #[arg(long)]
        price: Option<String>,

        #[arg(long = "total")]
        total_cost: Option<String>,

        #[arg(long)]
        date: Option<String>,
    },

    /// Delete a fill-up
    Delete {
        /// Fuel entry ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Show a vehicle's fill-ups with trip distance and efficiency
    History {
        /// Vehicle ID or name
        vehicle: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl FuelCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let store = &app.store;

        match &self.command {
            FuelSubcommand::Add {
                vehicle,
                odometer,
                liters,
                price,
                total_cost,
                date,
            } => {
                let vehicle = resolve_vehicle(store, vehicle)?;
                let entry = FuelEntryForm {
                    vehicle_id: vehicle.id.clone(),
                    date: date.clone(),
                    odometer: odometer.clone(),
                    liters: liters.clone(),
                    price: price.clone(),
                    total_cost: total_cost.clone(),
                }
                .validate(today())?;

                let id = store.add(entry).await;
                let entry = store
                    .fuel_entry(&id)
                    .ok_or_else(|| format!("Fuel entry not found: {}", id))?;
                println!("Added fill-up for {}:", vehicle.name);
                print_entry(&entry);
                Ok(())
            }

            FuelSubcommand::Edit {
                id,
                odometer,
                liters,
                price,
                total_cost,
                date,
            } => {
                if odometer.is_none()
                    && liters.is_none()
                    && price.is_none()
                    && total_cost.is_none()
                    && date.is_none()
                {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let existing = store
                    .fuel_entry(id)
                    .ok_or_else(|| format!("Fuel entry not found: {}", id))?;
                let form = apply_fuel_edits(
                    FuelEntryForm::from_entry(&existing),
                    odometer,
                    liters,
                    price,
                    total_cost,
                    date,
                );

                let mut entry = form.validate(today())?;
                entry.id = existing.id;
                store.edit(entry.clone()).await?;
                println!("Updated fill-up:");
                print_entry(&entry);
                Ok(())
            }

            FuelSubcommand::Delete { id, force } => {
                let entry = store
                    .fuel_entry(id)
                    .ok_or_else(|| format!("Fuel entry not found: {}", id))?;

                if !force
                    && !confirm(&format!(
                        "Delete fill-up of {} L on {}?",
                        entry.liters, entry.date
                    ))?
                {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                store.delete::<FuelEntry>(&entry.id).await;
                println!("Deleted fill-up {}", entry.id);
                Ok(())
            }

            FuelSubcommand::History { vehicle, format } => {
                let vehicle = resolve_vehicle(store, vehicle)?;
                let rows = metrics::fuel_history(&store.fuel_entries_for(&vehicle.id));

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                    OutputFormat::Text => {
                        if rows.is_empty() {
                            println!("No fill-ups recorded for {}", vehicle.name);
                            return Ok(());
                        }
                        println!("Fuel history: {}", vehicle);
                        println!();
                        print_history(&rows);
                    }
                }
                Ok(())
            }
        }
    }
}

/// Overlays edited fields on a prefilled form. A new price or total without
/// the other drops the stale counterpart so it is derived again.
fn apply_fuel_edits(
    mut form: FuelEntryForm,
    odometer: &Option<String>,
    liters: &Option<String>,
    price: &Option<String>,
    total_cost: &Option<String>,
    date: &Option<String>,
) -> FuelEntryForm {
    if let Some(odometer) = odometer {
        form.odometer = odometer.clone();
    }
    if let Some(liters) = liters {
        form.liters = liters.clone();
    }
    if let Some(date) = date {
        form.date = Some(date.clone());
    }
    match (price, total_cost) {
        (Some(price), Some(total)) => {
            form.price = Some(price.clone());
            form.total_cost = Some(total.clone());
        }
        (Some(price), None) => {
            form.price = Some(price.clone());
            form.total_cost = None;
        }
        (None, Some(total)) => {
            form.price = None;
            form.total_cost = Some(total.clone());
        }
        (None, None) if liters.is_some() => {
            form.total_cost = None;
        }
        (None, None) => {}
    }
    form
}

fn print_entry(entry: &FuelEntry) {
    println!("  id:       {}", entry.id);
    println!("  date:     {}", format_display_date(Some(entry.date)));
    println!("  odometer: {}", entry.odometer);
    println!("  liters:   {}", entry.liters);
    println!("  price:    {:.2}", entry.price);
    println!("  total:    {:.2}", entry.total_cost);
}

fn print_history(rows: &[FuelHistoryRow]) {
    println!(
        "{:<8}  {:>10}  {:>8}  {:>8}  {:>10}  {:>8}  {:>10}  ID",
        "DATE", "ODOMETER", "LITERS", "PRICE", "TOTAL", "TRIP", "MILEAGE"
    );
    println!("{}", "-".repeat(110));
    for row in rows {
        let trip = row
            .trip_distance
            .map(|d| format!("{:.1}", d))
            .unwrap_or_else(|| "-".to_string());
        let mileage = row
            .efficiency
            .map(|e| format!("{:.2}", e))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8}  {:>10}  {:>8.2}  {:>8.2}  {:>10.2}  {:>8}  {:>10}  {}",
            format_display_date(Some(row.entry.date)),
            row.entry.odometer,
            row.entry.liters,
            row.entry.price,
            row.entry.total_cost,
            trip,
            mileage,
            row.entry.id
        );
    }
    println!("\nTotal: {} fill-up(s)", rows.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn existing() -> FuelEntry {
        let day = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        FuelEntry::new("v1", day, 15000.0, 4.0, 100.0, 400.0)
    }

    #[test]
    fn test_new_price_rederives_total() {
        let form = apply_fuel_edits(
            FuelEntryForm::from_entry(&existing()),
            &None,
            &None,
            &Some("110".into()),
            &None,
            &None,
        );
        let entry = form.validate(today()).unwrap();
        assert_eq!(entry.price, 110.0);
        assert_eq!(entry.total_cost, 440.0);
    }

    #[test]
    fn test_new_total_rederives_price() {
        let form = apply_fuel_edits(
            FuelEntryForm::from_entry(&existing()),
            &None,
            &None,
            &None,
            &Some("500".into()),
            &None,
        );
        let entry = form.validate(today()).unwrap();
        assert_eq!(entry.price, 125.0);
        assert_eq!(entry.total_cost, 500.0);
    }

    #[test]
    fn test_new_liters_keeps_price() {
        let form = apply_fuel_edits(
            FuelEntryForm::from_entry(&existing()),
            &Some("15100".into()),
            &Some("5".into()),
            &None,
            &None,
            &None,
        );
        let entry = form.validate(today()).unwrap();
        assert_eq!(entry.odometer, 15100.0);
        assert_eq!(entry.price, 100.0);
        assert_eq!(entry.total_cost, 500.0);
        assert_eq!(entry.date, existing().date);
    }
}
