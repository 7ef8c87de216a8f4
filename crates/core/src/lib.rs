//! Cellionyx Core - Shared types library.
//!
//! This crate provides the domain types used across all CRM components:
//! - `crm` - HTTP API for lead intake, the sales portal, and the credit ledger
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, statuses, and credit packages
//! - [`scoring`] - The lead scoring function

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod scoring;
pub mod types;

pub use scoring::{LeadAttributes, LeadScore, lead_score};
pub use types::*;
