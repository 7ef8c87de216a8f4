//! Cellionyx CRM CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run CRM database migrations
//! crm-cli migrate
//!
//! # Create the first admin user
//! crm-cli user create -e admin@cellionyx.com -p 'Str0ng-Passw0rd' \
//!     --first-name Ada --last-name Admin -r Admin
//!
//! # Recompute rep performance counters once
//! crm-cli performance refresh
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` - Create portal users with any role
//! - `performance refresh` - Refresh rep performance counters

#![cfg_attr(not(test), forbid(unsafe_code))]

use cellionyx_core::Role;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "crm-cli")]
#[command(author, version, about = "Cellionyx CRM CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage portal users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Rep performance counters
    Performance {
        #[command(subcommand)]
        action: PerformanceAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Initial password
        #[arg(short, long)]
        password: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Role (`Admin`, `Country Head`, `Sales Rep`, `Customer`)
        #[arg(short, long, default_value = "Sales Rep")]
        role: Role,
    },
}

#[derive(Subcommand)]
enum PerformanceAction {
    /// Recompute counters for every rep
    Refresh,
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
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                password,
                first_name,
                last_name,
                role,
            } => {
                commands::user::create(commands::user::NewUser {
                    email: &email,
                    password: &password,
                    first_name: &first_name,
                    last_name: &last_name,
                    role,
                })
                .await?;
            }
        },
        Commands::Performance { action } => match action {
            PerformanceAction::Refresh => commands::performance::refresh().await?,
        },
    }
    Ok(())
}
