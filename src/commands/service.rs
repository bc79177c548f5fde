use clap::{Args, Subcommand};
use fueltrack_core::forms::ServiceEntryForm;
use fueltrack_core::metrics::format_display_date;
use fueltrack_core::ServiceEntry;

use super::{confirm, resolve_vehicle, today, OutputFormat};
use crate::app::App;

#[derive(Args)]
pub struct ServiceCommand {
    #[command(subcommand)]
    pub command: ServiceSubcommand,
}

#[derive(Subcommand)]
pub enum ServiceSubcommand {
    /// Record a service
    Add {
        /// Vehicle ID or name
        vehicle: String,

        /// Kind of service (e.g. "Oil change")
        #[arg(long = "type")]
        service_type: String,

        /// Odometer reading
        #[arg(long)]
        odometer: String,

        /// Cost (default: 0)
        #[arg(long)]
        cost: Option<String>,

        /// Payment mode: cash, online (default: cash)
        #[arg(long = "payment")]
        payment_mode: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Edit a service record
    Edit {
        /// Service entry ID
        id: String,

        #[arg(long = "type")]
        service_type: Option<String>,

        #[arg(long)]
        odometer: Option<String>,

        #[arg(long)]
        cost: Option<String>,

        #[arg(long = "payment")]
        payment_mode: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        date: Option<String>,
    },

    /// Delete a service record
    Delete {
        /// Service entry ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Show a vehicle's service records
    History {
        /// Vehicle ID or name
        vehicle: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ServiceCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        let store = &app.store;

        match &self.command {
            ServiceSubcommand::Add {
                vehicle,
                service_type,
                odometer,
                cost,
                payment_mode,
                notes,
                date,
            } => {
                let vehicle = resolve_vehicle(store, vehicle)?;
                let entry = ServiceEntryForm {
                    vehicle_id: vehicle.id.clone(),
                    date: date.clone(),
                    odometer: odometer.clone(),
                    service_type: service_type.clone(),
                    cost: cost.clone(),
                    payment_mode: payment_mode.clone(),
                    notes: notes.clone(),
                }
                .validate(today())?;

                let id = store.add(entry).await;
                let entry = store
                    .service_entry(&id)
                    .ok_or_else(|| format!("Service entry not found: {}", id))?;
                println!("Added service for {}:", vehicle.name);
                print_entry(&entry);
                Ok(())
            }

            ServiceSubcommand::Edit {
                id,
                service_type,
                odometer,
                cost,
                payment_mode,
                notes,
                date,
            } => {
                let has_updates = service_type.is_some()
                    || odometer.is_some()
                    || cost.is_some()
                    || payment_mode.is_some()
                    || notes.is_some()
                    || date.is_some();
                if !has_updates {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let existing = store
                    .service_entry(id)
                    .ok_or_else(|| format!("Service entry not found: {}", id))?;

                let mut form = ServiceEntryForm::from_entry(&existing);
                if let Some(service_type) = service_type {
                    form.service_type = service_type.clone();
                }
                if let Some(odometer) = odometer {
                    form.odometer = odometer.clone();
                }
                if cost.is_some() {
                    form.cost = cost.clone();
                }
                if payment_mode.is_some() {
                    form.payment_mode = payment_mode.clone();
                }
                if notes.is_some() {
                    form.notes = notes.clone();
                }
                if date.is_some() {
                    form.date = date.clone();
                }

                let mut entry = form.validate(today())?;
                entry.id = existing.id;
                store.edit(entry.clone()).await?;
                println!("Updated service:");
                print_entry(&entry);
                Ok(())
            }

            ServiceSubcommand::Delete { id, force } => {
                let entry = store
                    .service_entry(id)
                    .ok_or_else(|| format!("Service entry not found: {}", id))?;

                if !force
                    && !confirm(&format!(
                        "Delete service '{}' on {}?",
                        entry.service_type, entry.date
                    ))?
                {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                store.delete::<ServiceEntry>(&entry.id).await;
                println!("Deleted service {}", entry.id);
                Ok(())
            }

            ServiceSubcommand::History { vehicle, format } => {
                let vehicle = resolve_vehicle(store, vehicle)?;
                let entries = store.service_entries_for(&vehicle.id);

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&entries)?);
                    }
                    OutputFormat::Text => {
                        if entries.is_empty() {
                            println!("No services recorded for {}", vehicle.name);
                            return Ok(());
                        }
                        println!("Service history: {}", vehicle);
                        println!();
                        println!(
                            "{:<8}  {:<20}  {:>10}  {:>10}  {:<7}  ID",
                            "DATE", "TYPE", "ODOMETER", "COST", "PAID"
                        );
                        println!("{}", "-".repeat(100));
                        for entry in &entries {
                            println!(
                                "{:<8}  {:<20}  {:>10}  {:>10.2}  {:<7}  {}",
                                format_display_date(Some(entry.date)),
                                entry.service_type,
                                entry.odometer,
                                entry.cost,
                                entry.payment_mode.to_string(),
                                entry.id
                            );
                        }
                        println!("\nTotal: {} service(s)", entries.len());
                    }
                }
                Ok(())
            }
        }
    }
}

fn print_entry(entry: &ServiceEntry) {
    println!("  id:       {}", entry.id);
    println!("  date:     {}", format_display_date(Some(entry.date)));
    println!("  type:     {}", entry.service_type);
    println!("  odometer: {}", entry.odometer);
    println!("  cost:     {:.2} ({})", entry.cost, entry.payment_mode);
    if let Some(notes) = &entry.notes {
        println!("  notes:    {}", notes);
    }
}
