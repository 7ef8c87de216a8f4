//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! crm-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `CRM_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! Migrations live in `crates/crm/migrations/` and are embedded in the
//! binary at build time.

use cellionyx_crm::db::MIGRATOR;

use super::{CommandError, connect};

/// Apply every pending CRM migration.
pub async fn run() -> Result<(), CommandError> {
    let store = connect().await?;

    tracing::info!("Running CRM migrations...");
    MIGRATOR.run(store.pool()).await?;

    tracing::info!("CRM migrations complete!");
    Ok(())
}
