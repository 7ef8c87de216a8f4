//! Prospect records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cellionyx_core::{
    CtaType, CustomerId, Email, LeadScore, LeadStatus, Priority, ProspectId, ProspectStatus,
    UserId,
};

use super::CurrentUser;

/// A lead captured from a form or created by staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    pub id: ProspectId,
    /// De-duplication key; unique across prospects.
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub user_type: Option<String>,
    pub function_role: Option<String>,
    pub discipline: Option<String>,
    pub area_of_interest: Option<String>,
    pub intended_use: Option<String>,
    pub cta_type: CtaType,
    pub source_page: String,
    pub lead_source: String,
    pub marketing_consent: bool,
    pub status: ProspectStatus,
    pub lead_status: LeadStatus,
    pub stage: String,
    pub priority: Priority,
    pub assigned_rep_id: Option<UserId>,
    pub assigned_rep_name: Option<String>,
    pub lead_score: LeadScore,
    /// Append-only.
    pub form_submissions: Vec<FormSubmission>,
    /// Append-only.
    pub notes: Vec<ProspectNote>,
    pub customer_id: Option<CustomerId>,
    pub next_follow_up_at: Option<DateTime<Utc>>,
    pub last_contact_date: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prospect {
    /// "First Last".
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Apply an edit from the sales portal.
    ///
    /// Every present field overwrites the stored one; a note is appended.
    /// `updated_at` is always stamped with `now`.
    pub fn apply(&mut self, changes: &ProspectChanges, author: &CurrentUser, now: DateTime<Utc>) {
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(lead_status) = changes.lead_status {
            self.lead_status = lead_status;
        }
        if let Some(stage) = &changes.stage {
            self.stage.clone_from(stage);
        }
        if let Some(priority) = changes.priority {
            self.priority = priority;
        }
        if let Some(first_name) = &changes.first_name {
            self.first_name.clone_from(first_name);
        }
        if let Some(last_name) = &changes.last_name {
            self.last_name.clone_from(last_name);
        }

        let optional_fields = [
            (&changes.phone, &mut self.phone),
            (&changes.organization, &mut self.organization),
            (&changes.country, &mut self.country),
            (&changes.state, &mut self.state),
            (&changes.city, &mut self.city),
            (&changes.function_role, &mut self.function_role),
            (&changes.discipline, &mut self.discipline),
            (&changes.intended_use, &mut self.intended_use),
        ];
        for (change, field) in optional_fields {
            if let Some(value) = change {
                *field = Some(value.clone());
            }
        }

        if let Some(at) = changes.next_follow_up_at {
            self.next_follow_up_at = Some(at);
        }
        if let Some(text) = changes.note.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            self.notes.push(ProspectNote {
                text: text.to_owned(),
                author_id: Some(author.id),
                author_name: Some(author.display_name()),
                created_at: now,
            });
        }
        if self.status == ProspectStatus::Converted && self.converted_at.is_none() {
            self.converted_at = Some(now);
        }
        self.updated_at = now;
    }
}

/// One entry of a prospect's form history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmission {
    #[serde(rename = "type")]
    pub cta_type: CtaType,
    pub page: String,
    pub submitted_at: DateTime<Utc>,
}

/// A free-text note left on a prospect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProspectNote {
    pub text: String,
    pub author_id: Option<UserId>,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields a rep or admin may edit.
///
/// Unknown fields are rejected so a typo never silently drops an edit.
/// Assignment, email and score are not editable here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProspectChanges {
    pub status: Option<ProspectStatus>,
    pub lead_status: Option<LeadStatus>,
    pub stage: Option<String>,
    pub priority: Option<Priority>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub function_role: Option<String>,
    pub discipline: Option<String>,
    pub intended_use: Option<String>,
    pub next_follow_up_at: Option<DateTime<Utc>>,
    /// Appended to the note list.
    pub note: Option<String>,
}

impl ProspectChanges {
    /// Whether the edit changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Filter for prospect listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProspectFilter {
    pub assigned_rep_id: Option<UserId>,
    pub lead_status: Option<LeadStatus>,
    pub priority: Option<Priority>,
}

impl ProspectFilter {
    /// Whether a prospect passes the filter.
    #[must_use]
    pub fn matches(&self, prospect: &Prospect) -> bool {
        self.assigned_rep_id
            .is_none_or(|rep| prospect.assigned_rep_id == Some(rep))
            && self.lead_status.is_none_or(|s| prospect.lead_status == s)
            && self.priority.is_none_or(|p| prospect.priority == p)
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cellionyx_core::Role;

    use super::*;

    fn editor() -> CurrentUser {
        CurrentUser {
            id: UserId::generate(),
            email: Email::parse("rep@cellionyx.com").unwrap(),
            role: Role::SalesRep,
            first_name: "Rita".to_owned(),
            last_name: "Rep".to_owned(),
        }
    }

    #[test]
    fn test_apply_overwrites_present_fields_only() {
        let mut prospect = fixtures::prospect("a@b.com");
        let changes = ProspectChanges {
            lead_status: Some(LeadStatus::Contacted),
            phone: Some("555-0100".to_owned()),
            ..ProspectChanges::default()
        };
        let now = Utc::now();

        prospect.apply(&changes, &editor(), now);

        assert_eq!(prospect.lead_status, LeadStatus::Contacted);
        assert_eq!(prospect.status, ProspectStatus::New);
        assert_eq!(prospect.phone.as_deref(), Some("555-0100"));
        assert_eq!(prospect.organization.as_deref(), Some("Mercy Hospital"));
        assert_eq!(prospect.updated_at, now);
    }

    #[test]
    fn test_apply_appends_note() {
        let mut prospect = fixtures::prospect("a@b.com");
        let changes = ProspectChanges {
            note: Some("  left voicemail ".to_owned()),
            ..ProspectChanges::default()
        };

        prospect.apply(&changes, &editor(), Utc::now());
        prospect.apply(&changes, &editor(), Utc::now());

        assert_eq!(prospect.notes.len(), 2);
        assert_eq!(prospect.notes[0].text, "left voicemail");
        assert_eq!(prospect.notes[0].author_name.as_deref(), Some("Rita Rep"));
    }

    #[test]
    fn test_apply_converted_stamps_conversion_time() {
        let mut prospect = fixtures::prospect("a@b.com");
        let changes = ProspectChanges {
            status: Some(ProspectStatus::Converted),
            ..ProspectChanges::default()
        };
        let now = Utc::now();
        prospect.apply(&changes, &editor(), now);
        assert_eq!(prospect.converted_at, Some(now));
    }

    #[test]
    fn test_changes_reject_unknown_fields() {
        let raw = serde_json::json!({ "leadStatus": "Contacted", "assignedRepId": "x" });
        assert!(serde_json::from_value::<ProspectChanges>(raw).is_err());
    }

    #[test]
    fn test_changes_parse_labels() {
        let raw = serde_json::json!({ "status": "Demo Scheduled", "priority": "Low" });
        let changes: ProspectChanges = serde_json::from_value(raw).unwrap();
        assert_eq!(changes.status, Some(ProspectStatus::DemoScheduled));
        assert_eq!(changes.priority, Some(Priority::Low));
        assert!(!changes.is_empty());
        assert!(ProspectChanges::default().is_empty());
    }

    #[test]
    fn test_filter_matches() {
        let rep = UserId::generate();
        let mut prospect = fixtures::prospect("a@b.com");
        prospect.assigned_rep_id = Some(rep);

        assert!(ProspectFilter::default().matches(&prospect));
        assert!(
            ProspectFilter {
                assigned_rep_id: Some(rep),
                priority: Some(Priority::High),
                ..ProspectFilter::default()
            }
            .matches(&prospect)
        );
        assert!(
            !ProspectFilter {
                assigned_rep_id: Some(UserId::generate()),
                ..ProspectFilter::default()
            }
            .matches(&prospect)
        );
        assert!(
            !ProspectFilter {
                lead_status: Some(LeadStatus::Converted),
                ..ProspectFilter::default()
            }
            .matches(&prospect)
        );
    }
}
