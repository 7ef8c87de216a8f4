//! Core types for the Cellionyx CRM.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod credits;
pub mod cta;
pub mod email;
pub mod id;
pub mod status;

pub use credits::{CREDIT_PACKAGES, CreditPackage, CurrencyCode, Price};
pub use cta::CtaType;
pub use email::{Email, EmailError};
pub use id::*;
pub use status::*;
