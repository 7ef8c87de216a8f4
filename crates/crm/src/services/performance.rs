//! Rep performance counters.
//!
//! Conversion bumps a rep's converted counter immediately. The refresh here
//! recomputes every counter from the prospect table, which also corrects
//! drift after reassignments or deletes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use cellionyx_core::{ProspectStatus, UserId};

use crate::db::Store;
use crate::error::Result;
use crate::models::{CurrentUser, ProspectFilter, RepPerformance};
use crate::services::policy::{self, Capability};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub success: bool,
    pub reps_updated: usize,
}

pub struct PerformanceService<'a> {
    store: &'a dyn Store,
}

impl<'a> PerformanceService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Admin-triggered refresh.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for non-admins, or a store error.
    pub async fn refresh(&self, caller: &CurrentUser) -> Result<RefreshSummary> {
        policy::require(caller, Capability::ViewAnalytics)?;
        self.refresh_all().await
    }

    /// Recompute total, converted and rate for every rep.
    ///
    /// # Errors
    ///
    /// Returns a store error; reps updated before the failure keep their
    /// new figures.
    pub async fn refresh_all(&self) -> Result<RefreshSummary> {
        let prospects = self.store.list_prospects(ProspectFilter::default()).await?;
        let mut counts: HashMap<UserId, (i64, i64)> = HashMap::new();
        for prospect in &prospects {
            if let Some(rep) = prospect.assigned_rep_id {
                let entry = counts.entry(rep).or_default();
                entry.0 += 1;
                if prospect.status == ProspectStatus::Converted {
                    entry.1 += 1;
                }
            }
        }

        let now = Utc::now();
        let reps = self.store.list_reps().await?;
        for rep in &reps {
            let (total, converted) = counts.get(&rep.user_id).copied().unwrap_or_default();
            self.store
                .set_rep_performance(rep.user_id, RepPerformance::from_counts(total, converted, now))
                .await?;
        }

        tracing::info!(reps = reps.len(), "Updated rep performance metrics");
        Ok(RefreshSummary {
            success: true,
            reps_updated: reps.len(),
        })
    }
}

/// Refresh performance on a fixed interval until the runtime shuts down.
/// The first refresh runs one interval after startup.
pub async fn run_periodic(store: Arc<dyn Store>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval() fires immediately; skip that tick
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = PerformanceService::new(store.as_ref()).refresh_all().await {
            tracing::error!(error = %e, "Performance refresh failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cellionyx_core::{Email, Role};

    use super::*;
    use crate::db::{MemoryStore, ProspectStore, UserStore};
    use crate::models::User;
    use crate::models::prospect::fixtures;
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
    async fn test_refresh_counts_assigned_and_converted() {
        let store = MemoryStore::new();
        let rep = add_user(&store, "rita", Role::SalesRep).await;
        let idle = add_user(&store, "ivan", Role::SalesRep).await;

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
        ConversionService::new(&store)
            .convert(&rep, ids[0], ConvertRequest::default())
            .await
            .unwrap();

        let summary = PerformanceService::new(&store).refresh_all().await.unwrap();
        assert_eq!(summary.reps_updated, 2);

        let perf = store.get_rep(rep.id).await.unwrap().unwrap().performance;
        assert_eq!(perf.total_prospects, 4);
        assert_eq!(perf.converted_customers, 1);
        assert!((perf.conversion_rate - 25.0).abs() < f64::EPSILON);
        assert!(perf.last_updated.is_some());

        let perf = store.get_rep(idle.id).await.unwrap().unwrap().performance;
        assert_eq!(perf.total_prospects, 0);
        assert!((perf.conversion_rate - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_refresh_endpoint_is_admin_only() {
        let store = MemoryStore::new();
        let rep = add_user(&store, "rita", Role::SalesRep).await;
        let admin = add_user(&store, "root", Role::Admin).await;
        let service = PerformanceService::new(&store);

        assert!(service.refresh(&rep).await.is_err());
        assert!(service.refresh(&admin).await.unwrap().success);
    }
}
