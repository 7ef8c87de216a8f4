//! Portal users and sales reps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cellionyx_core::{Email, ProspectId, Role, UserId};

/// A portal identity with its mirrored profile.
///
/// The password hash is stored beside the user and never leaves the store
/// layer except for verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// "First Last".
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// The authenticated caller, resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
}

impl CurrentUser {
    /// "First Last".
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

/// A user that can receive prospect assignments.
///
/// Keyed by the owning user's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesRep {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    pub is_country_head: bool,
    pub is_active: bool,
    /// Set semantics: a prospect id appears at most once.
    pub assigned_prospects: Vec<ProspectId>,
    pub performance: RepPerformance,
    pub created_at: DateTime<Utc>,
}

impl SalesRep {
    /// A new, empty rep record for a sales user.
    #[must_use]
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            is_country_head: user.role == Role::CountryHead,
            is_active: user.is_active,
            assigned_prospects: Vec::new(),
            performance: RepPerformance::default(),
            created_at: user.created_at,
        }
    }

    /// "First Last".
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Current assignment load.
    #[must_use]
    pub fn load(&self) -> usize {
        self.assigned_prospects.len()
    }

    /// Add a prospect to the assignment set. Returns `false` if it was
    /// already present.
    pub fn add_prospect(&mut self, id: ProspectId) -> bool {
        if self.assigned_prospects.contains(&id) {
            return false;
        }
        self.assigned_prospects.push(id);
        true
    }

    /// Remove a prospect from the assignment set.
    pub fn remove_prospect(&mut self, id: ProspectId) {
        self.assigned_prospects.retain(|p| *p != id);
    }
}

/// Aggregate conversion figures for a rep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepPerformance {
    pub total_prospects: i64,
    pub converted_customers: i64,
    /// Percentage, two decimals.
    pub conversion_rate: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl RepPerformance {
    /// Compute figures from raw counts.
    #[must_use]
    pub fn from_counts(total_prospects: i64, converted_customers: i64, now: DateTime<Utc>) -> Self {
        Self {
            total_prospects,
            converted_customers,
            conversion_rate: percentage(converted_customers, total_prospects),
            last_updated: Some(now),
        }
    }
}

/// `part / whole * 100`, rounded to two decimals; zero when `whole` is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)] // counts stay far below 2^52
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: UserId::generate(),
            email: Email::parse("rep@cellionyx.com").unwrap(),
            first_name: "Rita".to_owned(),
            last_name: "Rep".to_owned(),
            role,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_rep_for_country_head() {
        let rep = SalesRep::for_user(&user(Role::CountryHead));
        assert!(rep.is_country_head);
        assert!(rep.is_active);
        assert_eq!(rep.load(), 0);
    }

    #[test]
    fn test_assignment_set_semantics() {
        let mut rep = SalesRep::for_user(&user(Role::SalesRep));
        let id = ProspectId::generate();

        assert!(rep.add_prospect(id));
        assert!(!rep.add_prospect(id));
        assert_eq!(rep.load(), 1);

        rep.remove_prospect(id);
        assert_eq!(rep.load(), 0);
    }

    #[test]
    fn test_percentage() {
        assert!((percentage(1, 3) - 33.33).abs() < f64::EPSILON);
        assert!((percentage(2, 2) - 100.0).abs() < f64::EPSILON);
        assert!((percentage(5, 0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_performance_from_counts() {
        let now = Utc::now();
        let perf = RepPerformance::from_counts(4, 1, now);
        assert!((perf.conversion_rate - 25.0).abs() < f64::EPSILON);
        assert_eq!(perf.last_updated, Some(now));
    }
}
