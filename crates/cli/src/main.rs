//! Pizzeria CLI - Database migrations and housekeeping tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply storefront database migrations
//! pizzeria migrate
//!
//! # Load (or refresh) the pizza catalog from YAML
//! pizzeria seed crates/cli/data/pizzas.yaml
//!
//! # Delete expired sessions, rate-limit markers and verification tokens
//! pizzeria purge
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Upsert catalog pizzas and tags from a YAML file
//! - `purge` - Remove expired rows from the key-value and verification tables

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pizzeria")]
#[command(author, version, about = "Pizzeria CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Seed the pizza catalog from a YAML file
    Seed {
        /// Path to the catalog YAML file
        #[arg(default_value = "crates/cli/data/pizzas.yaml")]
        file: String,
    },
    /// Delete expired sessions and verification tokens
    Purge,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Seed { file } => commands::seed::catalog(&file).await?,
        Commands::Purge => commands::purge::expired().await?,
    }
    Ok(())
}
