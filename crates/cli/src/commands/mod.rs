//! CLI subcommands.

pub mod migrate;
pub mod performance;
pub mod user;

use cellionyx_crm::db::{self, PgStore};
use secrecy::SecretString;

/// Connect to the CRM database named by `CRM_DATABASE_URL` (or `DATABASE_URL`).
async fn connect() -> Result<PgStore, CommandError> {
    dotenvy::dotenv().ok();

    let url = std::env::var("CRM_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| CommandError::MissingEnvVar("CRM_DATABASE_URL"))?;

    tracing::info!("Connecting to CRM database...");
    let pool = db::create_pool(&SecretString::from(url)).await?;
    Ok(PgStore::new(pool))
}

/// Errors shared by the database-backed commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The CRM rejected the operation.
    #[error("{0}")]
    Crm(String),
}
