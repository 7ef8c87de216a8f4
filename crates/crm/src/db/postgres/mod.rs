//! `PostgreSQL` store.
//!
//! Queries are built at runtime with `sqlx::query_as` into private row types,
//! which are converted into domain models through `TryFrom`. Label enums are
//! stored as text; a label the code does not know surfaces as
//! [`RepositoryError::DataCorruption`].

mod activity;
mod appointments;
mod careers;
mod ledger;
mod prospects;
mod users;

use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::PgPool;

use cellionyx_core::Email;

use super::RepositoryError;
use super::store::Store;

/// Store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connection pool. Migrations must already have run.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// Parse a stored label into its enum.
fn parse_label<T>(value: &str) -> Result<T, RepositoryError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| RepositoryError::DataCorruption(format!("{e}")))
}

fn parse_email(value: &str) -> Result<Email, RepositoryError> {
    Email::parse(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid email in database: {e}")))
}

/// Decode a JSONB column.
fn from_json<T: DeserializeOwned>(
    value: serde_json::Value,
    column: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_value(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid {column}: {e}")))
}

/// Encode a value for a JSONB column.
fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("unencodable value: {e}")))
}

/// Turn a unique violation into `Conflict`, pass everything else through.
fn conflict_on_unique(err: sqlx::Error, message: &str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::Conflict(message.to_owned())
        }
        _ => RepositoryError::Database(err),
    }
}
