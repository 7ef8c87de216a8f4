//! Activity log and rep notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cellionyx_core::{ActivityId, NotificationId, ProspectId, UserId};

use super::CurrentUser;

/// Activity type tags written by the server itself.
///
/// Reps may log any other tag through the log-activity endpoint.
pub mod activity_types {
    pub const PROSPECT_CREATED: &str = "prospect_created";
    pub const PROSPECT_UPDATED: &str = "prospect_updated";
    pub const PROSPECT_CONVERTED: &str = "prospect_converted";
    pub const APPOINTMENT_SCHEDULED: &str = "appointment_scheduled";
}

/// Immutable log entry about a prospect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: ActivityId,
    pub prospect_id: ProspectId,
    pub actor_id: UserId,
    pub actor_name: String,
    pub activity_type: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// A new entry authored by `actor`.
    #[must_use]
    pub fn new(
        prospect_id: ProspectId,
        actor: &CurrentUser,
        activity_type: impl Into<String>,
        details: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActivityId::generate(),
            prospect_id,
            actor_id: actor.id,
            actor_name: actor.display_name(),
            activity_type: activity_type.into(),
            details,
            created_at: now,
        }
    }
}

/// An in-portal notification for a user. Only the read flag is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub prospect_id: Option<ProspectId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Notification telling a rep a prospect was assigned to them.
    #[must_use]
    pub fn new_prospect(
        rep_id: UserId,
        prospect_id: ProspectId,
        prospect_name: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::generate(),
            user_id: rep_id,
            kind: "new_prospect".to_owned(),
            title: "New Prospect Assigned".to_owned(),
            message: format!("You have been assigned a new prospect: {prospect_name}"),
            prospect_id: Some(prospect_id),
            is_read: false,
            created_at: now,
        }
    }
}
