//! Public lead intake.
//!
//! A form submission either creates a prospect or, when a prospect with the
//! same email already exists, appends to its submission history. Status,
//! score and assignment of an existing prospect are never touched. The public
//! path does not assign a rep; staff triage new leads from the portal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cellionyx_core::{
    CtaType, Email, LeadAttributes, LeadStatus, ProspectId, ProspectStatus, lead_score,
};

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{FormSubmission, Prospect};
use crate::services::email::{LeadNotice, Mailer};

/// Page recorded when the form does not say where it was submitted.
const UNKNOWN_PAGE: &str = "unknown";

/// Thanks shown for a first submission.
pub const NEW_PROSPECT_MESSAGE: &str = "Thank you! We'll be in touch shortly.";

/// Thanks shown to a returning prospect.
pub const RETURNING_PROSPECT_MESSAGE: &str = "Welcome back! We've updated your information.";

/// A lead form as posted by the marketing site or the portal.
///
/// Everything is optional at the wire level; [`prospect_from_form`] decides
/// what is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProspectForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub user_type: Option<String>,
    /// Older forms send `userType` only.
    pub function_role: Option<String>,
    /// Older forms send `areaOfInterest` only.
    pub discipline: Option<String>,
    pub area_of_interest: Option<String>,
    pub intended_use: Option<String>,
    pub cta_type: Option<String>,
    pub page: Option<String>,
    pub consent: Option<bool>,
}

/// Response to a public submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub success: bool,
    pub message: &'static str,
    pub prospect_id: ProspectId,
}

/// Trimmed value, `None` when absent or blank.
pub(crate) fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Build a fresh prospect from a form.
///
/// `status` is the caller's choice (Active for public intake, New for the
/// portal). The lead status is always New. The prospect carries one recorded
/// submission and a score computed from the submitted attributes.
///
/// # Errors
///
/// Returns a validation error if first name, last name or email is missing,
/// or if the email is malformed.
pub fn prospect_from_form(
    form: &ProspectForm,
    status: ProspectStatus,
    now: DateTime<Utc>,
) -> Result<Prospect> {
    let (Some(first_name), Some(last_name), Some(email)) = (
        non_empty(form.first_name.as_ref()),
        non_empty(form.last_name.as_ref()),
        non_empty(form.email.as_ref()),
    ) else {
        return Err(AppError::missing_fields(
            "First name, last name, and email are required",
        ));
    };
    let email = Email::parse(&email).map_err(|e| AppError::Validation {
        error: "Invalid email address".to_owned(),
        details: e.to_string(),
    })?;

    let cta_type = form
        .cta_type
        .as_deref()
        .map_or(CtaType::Demo, CtaType::parse);
    let page = non_empty(form.page.as_ref()).unwrap_or_else(|| UNKNOWN_PAGE.to_owned());

    let user_type = non_empty(form.user_type.as_ref());
    let area_of_interest = non_empty(form.area_of_interest.as_ref());
    let function_role = non_empty(form.function_role.as_ref()).or_else(|| user_type.clone());
    let discipline = non_empty(form.discipline.as_ref()).or_else(|| area_of_interest.clone());

    let score = lead_score(&LeadAttributes {
        function_role: function_role.as_deref(),
        discipline: discipline.as_deref(),
        cta_type: Some(&cta_type),
    });

    Ok(Prospect {
        id: ProspectId::generate(),
        email,
        first_name,
        last_name,
        phone: non_empty(form.phone.as_ref()),
        organization: non_empty(form.organization.as_ref()),
        country: non_empty(form.country.as_ref()),
        state: non_empty(form.state.as_ref()),
        city: non_empty(form.city.as_ref()),
        user_type,
        function_role,
        discipline,
        area_of_interest,
        intended_use: non_empty(form.intended_use.as_ref()),
        lead_source: cta_type.lead_source().to_owned(),
        priority: cta_type.initial_priority(),
        source_page: page.clone(),
        form_submissions: vec![FormSubmission {
            cta_type: cta_type.clone(),
            page,
            submitted_at: now,
        }],
        cta_type,
        marketing_consent: form.consent.unwrap_or(false),
        status,
        lead_status: LeadStatus::New,
        stage: "Lead".to_owned(),
        assigned_rep_id: None,
        assigned_rep_name: None,
        lead_score: score,
        notes: Vec::new(),
        customer_id: None,
        next_follow_up_at: None,
        last_contact_date: Some(now),
        converted_at: None,
        created_at: now,
        updated_at: now,
    })
}

/// Lead intake service.
pub struct IntakeService<'a> {
    store: &'a dyn Store,
    mailer: &'a dyn Mailer,
}

impl<'a> IntakeService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, mailer: &'a dyn Mailer) -> Self {
        Self { store, mailer }
    }

    /// Record a public form submission.
    ///
    /// # Errors
    ///
    /// Returns a validation error for missing or malformed required fields
    /// (nothing is stored), or a database error.
    #[tracing::instrument(skip(self, form), fields(cta = form.cta_type.as_deref()))]
    pub async fn submit(&self, form: &ProspectForm) -> Result<SubmissionReceipt> {
        let candidate = prospect_from_form(form, ProspectStatus::Active, Utc::now())?;
        let submission = candidate
            .form_submissions
            .first()
            .cloned()
            .ok_or_else(|| AppError::Internal("candidate without submission".to_owned()))?;

        let outcome = self.store.upsert_submission(candidate).await?;
        let prospect = &outcome.prospect;

        if outcome.created {
            tracing::info!(prospect_id = %prospect.id, score = %prospect.lead_score, "New prospect created");
        } else {
            tracing::info!(prospect_id = %prospect.id, "Returning prospect updated");
        }

        let notice = LeadNotice {
            prospect,
            cta_type: &submission.cta_type,
            page: &submission.page,
            is_new: outcome.created,
        };
        if let Err(e) = self.mailer.send_lead_notification(notice).await {
            tracing::warn!(prospect_id = %prospect.id, error = %e, "Lead notification email failed");
        }

        Ok(SubmissionReceipt {
            success: true,
            message: if outcome.created {
                NEW_PROSPECT_MESSAGE
            } else {
                RETURNING_PROSPECT_MESSAGE
            },
            prospect_id: prospect.id,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cellionyx_core::Priority;

    use std::collections::HashSet;
    use std::sync::Arc;

    use tokio::task::JoinSet;

    use super::*;
    use crate::db::{MemoryStore, ProspectStore};
    use crate::services::email::NoopMailer;

    fn form(email: &str) -> ProspectForm {
        ProspectForm {
            first_name: Some("Ada".to_owned()),
            last_name: Some("Byron".to_owned()),
            email: Some(email.to_owned()),
            ..ProspectForm::default()
        }
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut blank_name = form("a@b.com");
        blank_name.first_name = Some("   ".to_owned());
        let err = prospect_from_form(&blank_name, ProspectStatus::Active, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation { error, .. } if error == "Missing required fields"));

        let no_email = ProspectForm {
            email: None,
            ..form("a@b.com")
        };
        assert!(prospect_from_form(&no_email, ProspectStatus::Active, Utc::now()).is_err());
    }

    #[test]
    fn test_malformed_email_rejected() {
        let err =
            prospect_from_form(&form("not-an-email"), ProspectStatus::Active, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation { error, .. } if error == "Invalid email address"));
    }

    #[test]
    fn test_defaults() {
        let prospect = prospect_from_form(&form(" a@b.com "), ProspectStatus::Active, Utc::now()).unwrap();

        assert_eq!(prospect.email.as_str(), "a@b.com");
        assert_eq!(prospect.cta_type, CtaType::Demo);
        assert_eq!(prospect.source_page, "unknown");
        assert!(!prospect.marketing_consent);
        assert_eq!(prospect.lead_source, "Demo Request");
        assert_eq!(prospect.priority, Priority::High);
        assert_eq!(prospect.status, ProspectStatus::Active);
        assert_eq!(prospect.lead_status, LeadStatus::New);
        assert_eq!(prospect.stage, "Lead");
        assert_eq!(prospect.lead_score.value(), 40);
        assert_eq!(prospect.form_submissions.len(), 1);
    }

    #[test]
    fn test_waitlist_source_and_priority() {
        let waitlist = ProspectForm {
            cta_type: Some("waitlist".to_owned()),
            ..form("a@b.com")
        };
        let prospect = prospect_from_form(&waitlist, ProspectStatus::Active, Utc::now()).unwrap();
        assert_eq!(prospect.lead_source, "Waitlist");
        assert_eq!(prospect.priority, Priority::Medium);
        assert_eq!(prospect.lead_score.value(), 20);
    }

    #[test]
    fn test_legacy_field_fallbacks() {
        let legacy = ProspectForm {
            user_type: Some("Hospital".to_owned()),
            area_of_interest: Some("Orthopedics".to_owned()),
            cta_type: Some("Request a Clinical Demo".to_owned()),
            ..form("a@b.com")
        };
        let prospect = prospect_from_form(&legacy, ProspectStatus::Active, Utc::now()).unwrap();

        assert_eq!(prospect.function_role.as_deref(), Some("Hospital"));
        assert_eq!(prospect.discipline.as_deref(), Some("Orthopedics"));
        assert_eq!(prospect.lead_score.value(), 95);
    }

    #[test]
    fn test_explicit_fields_win_over_legacy() {
        let both = ProspectForm {
            user_type: Some("Hospital".to_owned()),
            function_role: Some("Research Institution".to_owned()),
            ..form("a@b.com")
        };
        let prospect = prospect_from_form(&both, ProspectStatus::Active, Utc::now()).unwrap();
        assert_eq!(prospect.function_role.as_deref(), Some("Research Institution"));
        assert_eq!(prospect.user_type.as_deref(), Some("Hospital"));
    }

    #[tokio::test]
    async fn test_resubmission_appends_history() {
        let store = MemoryStore::new();
        let intake = IntakeService::new(&store, &NoopMailer);

        let first = intake.submit(&form("a@b.com")).await.unwrap();
        assert_eq!(first.message, NEW_PROSPECT_MESSAGE);

        let waitlist = ProspectForm {
            cta_type: Some("waitlist".to_owned()),
            page: Some("pricing".to_owned()),
            ..form("a@b.com")
        };
        let second = intake.submit(&waitlist).await.unwrap();
        assert_eq!(second.message, RETURNING_PROSPECT_MESSAGE);
        assert_eq!(second.prospect_id, first.prospect_id);

        let prospect = store.get_prospect(first.prospect_id).await.unwrap().unwrap();
        assert_eq!(prospect.form_submissions.len(), 2);
        assert_eq!(prospect.form_submissions[1].cta_type, CtaType::Waitlist);
        assert_eq!(prospect.form_submissions[1].page, "pricing");
        // First submission's classification stays
        assert_eq!(prospect.lead_source, "Demo Request");
        assert_eq!(prospect.lead_score.value(), 40);
        assert!(prospect.assigned_rep_id.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_share_one_prospect() {
        const SUBMISSIONS: usize = 16;
        let store = Arc::new(MemoryStore::new());

        let mut tasks = JoinSet::new();
        for i in 0..SUBMISSIONS {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                let visit = ProspectForm {
                    page: Some(format!("/page-{i}")),
                    ..form("same@clinic.com")
                };
                IntakeService::new(store.as_ref(), &NoopMailer)
                    .submit(&visit)
                    .await
            });
        }

        let mut ids = HashSet::new();
        let mut created = 0;
        while let Some(joined) = tasks.join_next().await {
            let receipt = joined.unwrap().unwrap();
            ids.insert(receipt.prospect_id);
            if receipt.message == NEW_PROSPECT_MESSAGE {
                created += 1;
            }
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(created, 1);

        let all = store.list_prospects(Default::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        let pages: HashSet<&str> = all[0]
            .form_submissions
            .iter()
            .map(|s| s.page.as_str())
            .collect();
        assert_eq!(all[0].form_submissions.len(), SUBMISSIONS);
        assert_eq!(pages.len(), SUBMISSIONS);
    }

    #[tokio::test]
    async fn test_invalid_submission_stores_nothing() {
        let store = MemoryStore::new();
        let intake = IntakeService::new(&store, &NoopMailer);

        let invalid = ProspectForm {
            last_name: None,
            ..form("a@b.com")
        };
        assert!(intake.submit(&invalid).await.is_err());

        let all = store.list_prospects(Default::default()).await.unwrap();
        assert!(all.is_empty());
    }
}
