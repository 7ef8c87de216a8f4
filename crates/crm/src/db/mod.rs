//! Persistence for the CRM.
//!
//! Handlers never talk to a database directly; they go through the [`Store`]
//! trait, which has two backends:
//!
//! - [`PgStore`] - `PostgreSQL` via sqlx, used in production
//! - [`MemoryStore`] - a single-lock in-process store, used by tests and when
//!   no database URL is configured
//!
//! Every operation that touches more than one record (assignment, credit
//! debits, purchase grants, conversion, edits plus their activity entry) is a
//! single store call, executed in one transaction on `PostgreSQL` and under one
//! lock in memory. Callers never stitch multi-record writes together.
//!
//! # Database schema: `crm`
//!
//! - `prospects` - Leads, unique by email
//! - `users` - Portal identities with password hashes and role claims
//! - `sales_reps` - Assignment targets, keyed by user id
//! - `appointments` - Rep meetings
//! - `customers`, `devices`, `purchases`, `treatment_logs` - Credit ledger
//! - `activities` - Append-only prospect log
//! - `notifications` - In-portal notifications
//! - `career_applications` - Job applications
//!
//! # Migrations
//!
//! Migrations are stored in `crates/crm/migrations/` and run via:
//! ```bash
//! cargo run -p cellionyx-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;
mod store;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use cellionyx_core::UserId;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{
    ActivityStore, AppointmentStore, Assignment, CareerStore, Conversion, ConversionRecord, Debit,
    Grant, LedgerStore, ProspectStore, Store, SubmissionOutcome, UserLogin, UserStore,
};

/// Migrations embedded from `crates/crm/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A scoped write found the prospect assigned to someone else.
    #[error("prospect is not assigned to the caller")]
    NotAssigned,
}

/// Fail with `NotAssigned` when a write is scoped to `assignee` and the
/// prospect is currently held by anyone else.
pub(crate) fn check_assignee(
    assigned_rep_id: Option<UserId>,
    assignee: Option<UserId>,
) -> Result<(), RepositoryError> {
    match assignee {
        Some(rep) if assigned_rep_id != Some(rep) => Err(RepositoryError::NotAssigned),
        _ => Ok(()),
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
