//! Authentication commands for the FuelTrack CLI.
//!
//! Signing in moves any records made offline into the account; signing out
//! returns the CLI to guest mode.

use clap::{Args, Subcommand};
use fueltrack_core::IdentityProvider;
use std::io::{self, Write};

use crate::app::{identity_provider, App, AppError};
use fueltrack::config::Config;

/// Authentication commands
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand)]
enum AuthSubcommand {
    /// Sign in to the sync server
    Login {
        /// Account email
        email: String,

        /// Password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account on the sync server and sign in
    Signup {
        /// Account email
        email: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and return to guest mode
    Logout,
    /// Show who is signed in
    Status,
}

impl AuthCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let provider = identity_provider(config)?.ok_or(AppError::NotConfigured)?;

        match &self.command {
            AuthSubcommand::Login { email, password } => {
                let password = password_or_prompt(password)?;
                let identity = provider.sign_in(email, &password).await?;
                println!("Signed in as {}", identity.label());
                sync_after_sign_in(config).await
            }
            AuthSubcommand::Signup {
                email,
                name,
                password,
            } => {
                let password = password_or_prompt(password)?;
                let identity = provider
                    .sign_up(email, &password, name.as_deref())
                    .await?;
                println!("Account created. Signed in as {}", identity.label());
                sync_after_sign_in(config).await
            }
            AuthSubcommand::Logout => {
                if provider.current().is_none() {
                    println!("Not signed in.");
                    return Ok(());
                }
                provider.sign_out().await?;
                println!("Signed out. Records made from now on stay on this device.");
                Ok(())
            }
            AuthSubcommand::Status => {
                println!("Server: {}", provider.base_url());
                match provider.current() {
                    Some(identity) => {
                        println!("Signed in as {}", identity.label());
                        println!("  email: {}", identity.email);
                        println!("  uid:   {}", identity.uid);
                    }
                    None => println!("Not signed in (guest mode)"),
                }
                Ok(())
            }
        }
    }
}

/// Opens the app with the new session so guest records migrate right away.
async fn sync_after_sign_in(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open(config).await?;
    let records = app.store.snapshot();
    println!(
        "Synced {} vehicle(s), {} fill-up(s), {} service(s)",
        records.vehicles.len(),
        records.fuel_entries.len(),
        records.service_entries.len()
    );
    app.close().await;
    Ok(())
}

fn password_or_prompt(password: &Option<String>) -> Result<String, io::Error> {
    if let Some(password) = password {
        return Ok(password.clone());
    }

    print!("Password: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim_end_matches(['\r', '\n']).to_string();

    if input.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Password cannot be empty",
        ));
    }
    Ok(input)
}
