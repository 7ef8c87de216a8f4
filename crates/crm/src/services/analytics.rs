//! Admin dashboard figures, recomputed on every request.

use std::collections::HashMap;

use serde::Serialize;

use cellionyx_core::{ProspectStatus, Role, UserId};

use crate::db::Store;
use crate::error::Result;
use crate::models::user::percentage;
use crate::models::{CurrentUser, ProspectFilter};
use crate::services::policy::{self, Capability};

/// Revenue credited per converted prospect, in dollars.
pub const REVENUE_PER_CONVERSION: i64 = 50_000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_prospects: usize,
    pub total_customers: usize,
    /// Customers per prospect, as a percentage with two decimals.
    pub conversion_rate: f64,
    pub total_revenue: i64,
    pub avg_deal_size: f64,
    pub team_performance: Vec<TeamMember>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamMember {
    pub name: String,
    pub prospects: usize,
    pub appointments: usize,
    pub conversions: usize,
    pub revenue: i64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    prospects: usize,
    conversions: usize,
    appointments: usize,
}

pub struct AnalyticsService<'a> {
    store: &'a dyn Store,
}

impl<'a> AnalyticsService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Pipeline totals and per-rep figures over users with the Sales Rep
    /// role.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for non-admins, or a store error.
    #[tracing::instrument(skip_all, fields(user_id = %caller.id))]
    pub async fn dashboard(&self, caller: &CurrentUser) -> Result<Analytics> {
        policy::require(caller, Capability::ViewAnalytics)?;

        let prospects = self.store.list_prospects(ProspectFilter::default()).await?;
        let users = self.store.list_users().await?;
        let appointments = self.store.list_appointments(None).await?;

        let mut tallies: HashMap<UserId, Tally> = HashMap::new();
        for prospect in &prospects {
            if let Some(rep) = prospect.assigned_rep_id {
                let tally = tallies.entry(rep).or_default();
                tally.prospects += 1;
                if prospect.status == ProspectStatus::Converted {
                    tally.conversions += 1;
                }
            }
        }
        for appointment in &appointments {
            tallies.entry(appointment.rep_id).or_default().appointments += 1;
        }

        let team_performance: Vec<TeamMember> = users
            .iter()
            .filter(|u| u.role == Role::SalesRep)
            .map(|u| {
                let tally = tallies.get(&u.id).copied().unwrap_or_default();
                TeamMember {
                    name: u.display_name(),
                    prospects: tally.prospects,
                    appointments: tally.appointments,
                    conversions: tally.conversions,
                    revenue: revenue(tally.conversions),
                }
            })
            .collect();

        let total_prospects = prospects.len();
        let total_customers = users.iter().filter(|u| u.role == Role::Customer).count();
        let total_revenue: i64 = team_performance.iter().map(|m| m.revenue).sum();

        Ok(Analytics {
            total_prospects,
            total_customers,
            conversion_rate: percentage(as_i64(total_customers), as_i64(total_prospects)),
            total_revenue,
            avg_deal_size: average(total_revenue, total_customers),
            team_performance,
        })
    }
}

fn as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn revenue(conversions: usize) -> i64 {
    as_i64(conversions).saturating_mul(REVENUE_PER_CONVERSION)
}

#[allow(clippy::cast_precision_loss)] // dashboard figures, far below 2^52
fn average(total: i64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total as f64 / count as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use cellionyx_core::Email;

    use super::*;
    use crate::db::{MemoryStore, ProspectStore, UserStore};
    use crate::models::User;
    use crate::models::prospect::fixtures;
    use crate::services::appointments::{AppointmentService, ScheduleRequest};
    use crate::services::conversion::{ConversionService, ConvertRequest};

    async fn add_user(store: &MemoryStore, name: &str, role: Role) -> CurrentUser {
        let now = Utc::now();
        let user = User {
            id: UserId::generate(),
            email: Email::parse(&format!("{name}@cellionyx.com")).unwrap(),
            first_name: name.to_owned(),
            last_name: "Staff".to_owned(),
            role,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        CurrentUser::from(&store.insert_user(user, "hash".to_owned()).await.unwrap())
    }

    #[tokio::test]
    async fn test_dashboard_figures() {
        let store = MemoryStore::new();
        let admin = add_user(&store, "root", Role::Admin).await;
        let rep = add_user(&store, "rita", Role::SalesRep).await;

        let mut ids = Vec::new();
        for i in 0..4 {
            let id = store
                .upsert_submission(fixtures::prospect(&format!("lead{i}@clinic.com")))
                .await
                .unwrap()
                .prospect
                .id;
            store.assign_prospect(id, Some(rep.id), Utc::now()).await.unwrap();
            ids.push(id);
        }
        AppointmentService::new(&store)
            .schedule(
                &rep,
                &ScheduleRequest {
                    prospect_id: ids[1],
                    appointment_date: Utc::now(),
                    appointment_type: Some("Demo".to_owned()),
                    notes: None,
                },
            )
            .await
            .unwrap();
        ConversionService::new(&store)
            .convert(&rep, ids[0], ConvertRequest::default())
            .await
            .unwrap();

        let figures = AnalyticsService::new(&store).dashboard(&admin).await.unwrap();

        assert_eq!(figures.total_prospects, 4);
        assert_eq!(figures.total_customers, 1);
        assert!((figures.conversion_rate - 25.0).abs() < f64::EPSILON);
        assert_eq!(figures.total_revenue, 50_000);
        assert!((figures.avg_deal_size - 50_000.0).abs() < f64::EPSILON);

        assert_eq!(figures.team_performance.len(), 1);
        let member = &figures.team_performance[0];
        assert_eq!(member.name, "rita Staff");
        assert_eq!(member.prospects, 4);
        assert_eq!(member.appointments, 1);
        assert_eq!(member.conversions, 1);
    }

    #[tokio::test]
    async fn test_empty_dashboard() {
        let store = MemoryStore::new();
        let admin = add_user(&store, "root", Role::Admin).await;

        let figures = AnalyticsService::new(&store).dashboard(&admin).await.unwrap();
        assert_eq!(figures.total_prospects, 0);
        assert!((figures.conversion_rate - 0.0).abs() < f64::EPSILON);
        assert!((figures.avg_deal_size - 0.0).abs() < f64::EPSILON);
        assert!(figures.team_performance.is_empty());
    }
}
