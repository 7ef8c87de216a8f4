//! Customer, device and credit ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cellionyx_core::{CustomerId, DeviceId, Email, ProspectId, PurchaseId, TreatmentLogId, UserId};

/// A postal address as entered in the portal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// A converted prospect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    /// The Customer-role identity created at conversion.
    pub user_id: UserId,
    pub prospect_id: Option<ProspectId>,
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    /// Payment processor customer id; set on first purchase.
    pub payment_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A treatment device and its credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    pub customer_id: CustomerId,
    pub serial_number: Option<String>,
    /// Never negative.
    pub credits_remaining: i64,
    /// Only ever grows.
    pub total_credits_used: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A completed credit purchase. Only successful charges are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: PurchaseId,
    pub customer_id: CustomerId,
    pub device_id: DeviceId,
    pub package_id: String,
    pub package_name: String,
    pub credits: i64,
    pub amount_cents: i64,
    pub currency: String,
    /// Processor payment id; unique, so a replayed grant is detected.
    pub payment_id: String,
    /// Client request id the charge was keyed by.
    pub request_id: String,
    pub created_at: DateTime<Utc>,
}

/// One debit of treatment credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentLog {
    pub id: TreatmentLogId,
    pub customer_id: CustomerId,
    pub device_id: DeviceId,
    pub credits_used: i64,
    pub treatment_type: String,
    pub treatment_duration_minutes: Option<i32>,
    pub created_at: DateTime<Utc>,
}
