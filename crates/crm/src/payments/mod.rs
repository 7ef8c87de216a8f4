//! Payment processor boundary.
//!
//! The ledger only needs two calls: create a processor customer, and charge a
//! stored payment method with an idempotency key. [`StripeClient`] is the
//! production implementation; tests substitute their own.

mod stripe;

pub use stripe::StripeClient;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use cellionyx_core::{CurrencyCode, Email};

/// Errors talking to the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Processor returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Final state of a charge as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Processing,
    RequiresAction,
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresCapture,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// Only a succeeded charge grants credits.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// A charge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    /// Processor payment id.
    pub id: String,
    pub status: PaymentStatus,
}

/// Parameters of a charge.
#[derive(Debug, Clone)]
pub struct ChargeRequest<'a> {
    /// Processor customer id.
    pub customer_id: &'a str,
    pub payment_method_id: &'a str,
    pub amount_cents: i64,
    pub currency: CurrencyCode,
    /// Shown on the processor dashboard.
    pub description: &'a str,
    /// Replaying the same key returns the original charge.
    pub idempotency_key: &'a str,
}

/// A payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a processor-side customer and return its id.
    async fn create_customer(&self, email: &Email, name: &str) -> Result<String, PaymentError>;

    /// Charge a payment method immediately.
    async fn charge(&self, request: ChargeRequest<'_>) -> Result<PaymentIntent, PaymentError>;
}
