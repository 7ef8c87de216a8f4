//! Career applications from the public site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cellionyx_core::{ApplicationId, Email};

/// A job application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareerApplication {
    pub id: ApplicationId,
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    pub phone: Option<String>,
    pub introduction: String,
    pub interest: String,
    pub position: String,
    pub resume_url: Option<String>,
    /// "New" until someone reviews it.
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl CareerApplication {
    /// Status of an unreviewed application.
    pub const STATUS_NEW: &'static str = "New";

    /// "First Last".
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
