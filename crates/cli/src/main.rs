//! TiTi Mall CLI - Database migrations and payment operations.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! titi-cli migrate
//!
//! # List payments stuck for more than 30 minutes
//! titi-cli payments stale --minutes 30
//!
//! # Cancel an orphaned payment on Pi and in the ledger ("Clear Pending")
//! titi-cli payments clear <payment-id>
//!
//! # Provision an admin
//! titi-cli users set-role <uid> admin
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `payments stale` - List open or unrecorded payments
//! - `payments clear` - Cancel a pending payment
//! - `users set-role` - Set a stored role

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "titi-cli")]
#[command(author, version, about = "TiTi Mall operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Inspect and clear Pi payments
    Payments {
        #[command(subcommand)]
        action: PaymentsAction,
    },
    /// Manage stored user roles
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
}

#[derive(Subcommand)]
enum PaymentsAction {
    /// List payments left open, or completed without an order
    Stale {
        /// Only payments untouched for at least this many minutes
        #[arg(short, long, default_value_t = 30)]
        minutes: u32,
    },
    /// Cancel a payment on Pi and mark it cancelled in the ledger
    Clear {
        /// Pi payment identifier
        payment_id: String,
    },
}

#[derive(Subcommand)]
enum UsersAction {
    /// Set the stored role of a Pi user
    SetRole {
        /// Pi user id
        uid: String,

        /// Role (`customer`, `seller`, `admin`)
        role: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

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
        Commands::Payments { action } => match action {
            PaymentsAction::Stale { minutes } => commands::payments::stale(minutes).await?,
            PaymentsAction::Clear { payment_id } => commands::payments::clear(&payment_id).await?,
        },
        Commands::Users { action } => match action {
            UsersAction::SetRole { uid, role } => commands::users::set_role(&uid, &role).await?,
        },
    }
    Ok(())
}
