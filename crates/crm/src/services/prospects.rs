//! Prospect operations for the sales portal.
//!
//! Every operation takes the authenticated caller and consults the role
//! policy before touching the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cellionyx_core::{LeadStatus, Priority, ProspectId, ProspectStatus};

use crate::db::{RepositoryError, Store};
use crate::error::{AppError, Result};
use crate::models::{
    Activity, CurrentUser, Prospect, ProspectChanges, ProspectFilter, ProspectNote,
    activity_types,
};
use crate::services::assignment::AssignmentService;
use crate::services::intake::{ProspectForm, non_empty, prospect_from_form};
use crate::services::policy::{self, Capability, ProspectScope};

/// Filters accepted by the prospect listing.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ProspectQuery {
    /// Matched against `leadStatus`.
    pub status: Option<LeadStatus>,
    pub priority: Option<Priority>,
}

/// Prospect row as the portal's list view reads it.
#[derive(Debug, Clone, Serialize)]
pub struct ProspectSummary {
    pub prospect_id: ProspectId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub organization: String,
    pub status: LeadStatus,
    pub priority: Priority,
    pub lead_score: u8,
    pub created_at: DateTime<Utc>,
    pub assigned_rep: Option<String>,
    pub function_role: String,
    pub discipline: String,
    pub notes: Vec<ProspectNote>,
}

impl From<Prospect> for ProspectSummary {
    fn from(p: Prospect) -> Self {
        Self {
            prospect_id: p.id,
            first_name: p.first_name,
            last_name: p.last_name,
            email: p.email.into_inner(),
            phone: p.phone.unwrap_or_default(),
            organization: p.organization.unwrap_or_default(),
            status: p.lead_status,
            priority: p.priority,
            lead_score: p.lead_score.value(),
            created_at: p.created_at,
            assigned_rep: p.assigned_rep_name,
            function_role: p.function_role.unwrap_or_default(),
            discipline: p.discipline.unwrap_or_default(),
            notes: p.notes,
        }
    }
}

/// Body of `POST /reps/log-activity`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActivityRequest {
    pub prospect_id: ProspectId,
    pub activity_type: Option<String>,
    pub notes: Option<String>,
}

/// Prospect operations.
pub struct ProspectService<'a> {
    store: &'a dyn Store,
}

impl<'a> ProspectService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Create a prospect from the portal, then assign it round-robin.
    ///
    /// # Errors
    ///
    /// Returns a validation error for missing fields and `Conflict` when a
    /// prospect with the email already exists.
    #[tracing::instrument(skip(self, caller, form), fields(user_id = %caller.id))]
    pub async fn create(&self, caller: &CurrentUser, form: &ProspectForm) -> Result<Prospect> {
        policy::require(caller, Capability::CreateProspects)?;

        let now = Utc::now();
        let prospect = prospect_from_form(form, ProspectStatus::New, now)?;
        let activity = Activity::new(
            prospect.id,
            caller,
            activity_types::PROSPECT_CREATED,
            serde_json::json!({
                "leadScore": prospect.lead_score,
                "ctaType": prospect.cta_type,
            }),
            now,
        );

        let prospect = self
            .store
            .create_prospect(prospect, activity)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => {
                    AppError::Conflict("A prospect with this email already exists".to_owned())
                }
                other => other.into(),
            })?;

        let assigned = AssignmentService::new(self.store)
            .assign(prospect.id, None)
            .await?;

        Ok(assigned.map_or(prospect, |a| a.prospect))
    }

    /// Prospects visible to the caller, newest first.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for roles without prospect access.
    pub async fn list(&self, caller: &CurrentUser, query: ProspectQuery) -> Result<Vec<Prospect>> {
        let assigned_rep_id = match policy::prospect_scope(caller.role) {
            ProspectScope::All => None,
            ProspectScope::Assigned => Some(caller.id),
            ProspectScope::None => {
                return Err(AppError::PermissionDenied(
                    "Sales staff access required".to_owned(),
                ));
            }
        };

        let prospects = self
            .store
            .list_prospects(ProspectFilter {
                assigned_rep_id,
                lead_status: query.status,
                priority: query.priority,
            })
            .await?;

        tracing::debug!(user_id = %caller.id, count = prospects.len(), "Listed prospects");
        Ok(prospects)
    }

    /// A single prospect the caller may access.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `PermissionDenied`.
    pub async fn get(&self, caller: &CurrentUser, id: ProspectId) -> Result<Prospect> {
        policy::require(caller, Capability::WorkProspects)?;
        let prospect = self
            .store
            .get_prospect(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Prospect not found".to_owned()))?;
        policy::require_prospect(caller, &prospect)?;
        Ok(prospect)
    }

    /// Apply a portal edit.
    ///
    /// `updates` is the raw JSON object from the request; it is validated
    /// into [`ProspectChanges`] and recorded verbatim on the activity entry.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown or mistyped fields, otherwise
    /// as [`Self::get`].
    #[tracing::instrument(skip(self, caller, updates), fields(user_id = %caller.id))]
    pub async fn update(
        &self,
        caller: &CurrentUser,
        id: ProspectId,
        updates: serde_json::Value,
    ) -> Result<Prospect> {
        let changes: ProspectChanges =
            serde_json::from_value(updates.clone()).map_err(|e| AppError::Validation {
                error: "Invalid updates".to_owned(),
                details: e.to_string(),
            })?;

        self.get(caller, id).await?;

        let activity = Activity::new(
            id,
            caller,
            activity_types::PROSPECT_UPDATED,
            updates,
            Utc::now(),
        );
        let prospect = self
            .store
            .update_prospect(id, &changes, caller, policy::required_assignee(caller), activity)
            .await
            .map_err(not_found)?;

        tracing::info!(prospect_id = %id, "Prospect updated");
        Ok(prospect)
    }

    /// Activity log of a prospect, newest first.
    ///
    /// # Errors
    ///
    /// As [`Self::get`].
    pub async fn activities(&self, caller: &CurrentUser, id: ProspectId) -> Result<Vec<Activity>> {
        self.get(caller, id).await?;
        Ok(self.store.list_activities(id).await?)
    }

    /// Log a rep contact and touch the prospect's last contact date.
    ///
    /// # Errors
    ///
    /// Returns a validation error without an activity type, otherwise as
    /// [`Self::get`].
    pub async fn log_activity(
        &self,
        caller: &CurrentUser,
        request: &LogActivityRequest,
    ) -> Result<Activity> {
        let activity_type = non_empty(request.activity_type.as_ref())
            .ok_or_else(|| AppError::missing_fields("prospectId and activityType are required"))?;

        self.get(caller, request.prospect_id).await?;

        let activity = Activity::new(
            request.prospect_id,
            caller,
            activity_type,
            serde_json::json!({ "notes": request.notes }),
            Utc::now(),
        );
        self.store
            .record_contact(activity.clone(), policy::required_assignee(caller))
            .await
            .map_err(not_found)?;

        Ok(activity)
    }

    /// Hard delete.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for non-admins and `NotFound`.
    pub async fn delete(&self, caller: &CurrentUser, id: ProspectId) -> Result<()> {
        policy::require(caller, Capability::DeleteProspects)?;
        self.store.delete_prospect(id).await.map_err(not_found)?;
        tracing::info!(prospect_id = %id, user_id = %caller.id, "Prospect deleted");
        Ok(())
    }
}

fn not_found(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("Prospect not found".to_owned()),
        other => other.into(),
    }
}
