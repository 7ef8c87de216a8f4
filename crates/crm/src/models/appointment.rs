//! Appointment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cellionyx_core::{AppointmentId, AppointmentStatus, ProspectId, UserId};

/// A scheduled meeting between a rep and a prospect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: AppointmentId,
    pub prospect_id: ProspectId,
    pub prospect_name: String,
    pub rep_id: UserId,
    pub rep_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub appointment_type: String,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
