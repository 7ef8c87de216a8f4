//! Round-robin assignment of prospects to sales reps.
//!
//! The store picks the least-loaded active rep (ties go to the rep created
//! first) and moves the prospect between assignment sets in one operation.
//! The assigned rep then gets an unread notification.

use chrono::Utc;

use cellionyx_core::{ProspectId, UserId};

use crate::db::{Assignment, RepositoryError, Store};
use crate::error::{AppError, Result};
use crate::models::Notification;

/// Assigns prospects and notifies the chosen rep.
pub struct AssignmentService<'a> {
    store: &'a dyn Store,
}

impl<'a> AssignmentService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Assign a prospect to `rep`, or to the least-loaded active rep.
    ///
    /// Returns `None` when no rep was named and no active rep exists; the
    /// prospect stays unassigned.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown prospect, `InvalidArgument` for an
    /// unknown or inactive rep.
    #[tracing::instrument(skip(self))]
    pub async fn assign(
        &self,
        prospect_id: ProspectId,
        rep: Option<UserId>,
    ) -> Result<Option<Assignment>> {
        let now = Utc::now();
        let assignment = match self.store.assign_prospect(prospect_id, rep, now).await {
            Ok(assignment) => assignment,
            Err(RepositoryError::NotFound) if rep.is_some() => {
                // Either side may be missing; report which
                if self.store.get_prospect(prospect_id).await?.is_none() {
                    return Err(AppError::NotFound("Prospect not found".to_owned()));
                }
                return Err(AppError::InvalidArgument("Sales rep not found".to_owned()));
            }
            Err(RepositoryError::NotFound) => {
                return Err(AppError::NotFound("Prospect not found".to_owned()));
            }
            Err(RepositoryError::Conflict(_)) => {
                return Err(AppError::InvalidArgument("Sales rep is not active".to_owned()));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(assignment) = assignment else {
            tracing::warn!(%prospect_id, "No active sales reps, prospect left unassigned");
            return Ok(None);
        };

        tracing::info!(
            %prospect_id,
            rep_id = %assignment.rep.user_id,
            previous_rep_id = ?assignment.previous_rep_id,
            "Prospect assigned"
        );

        let notification = Notification::new_prospect(
            assignment.rep.user_id,
            prospect_id,
            &assignment.prospect.full_name(),
            now,
        );
        if let Err(e) = self.store.insert_notification(notification).await {
            tracing::warn!(%prospect_id, error = %e, "Failed to notify assigned rep");
        }

        Ok(Some(assignment))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cellionyx_core::{Email, Role};

    use super::*;
    use crate::db::{ActivityStore, MemoryStore, ProspectStore, UserStore};
    use crate::models::User;
    use crate::models::prospect::fixtures;

    async fn add_rep(store: &MemoryStore, name: &str) -> UserId {
        let now = Utc::now();
        let user = User {
            id: UserId::generate(),
            email: Email::parse(&format!("{name}@cellionyx.com")).unwrap(),
            first_name: name.to_owned(),
            last_name: "Rep".to_owned(),
            role: Role::SalesRep,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_user(user, "hash".to_owned()).await.unwrap().id
    }

    async fn add_prospect(store: &MemoryStore, email: &str) -> ProspectId {
        store
            .upsert_submission(fixtures::prospect(email))
            .await
            .unwrap()
            .prospect
            .id
    }

    #[tokio::test]
    async fn test_round_robin_balances_load() {
        let store = MemoryStore::new();
        let alice = add_rep(&store, "alice").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let bob = add_rep(&store, "bob").await;
        let service = AssignmentService::new(&store);

        let mut picks = Vec::new();
        for i in 0..4 {
            let id = add_prospect(&store, &format!("lead{i}@clinic.com")).await;
            let assignment = service.assign(id, None).await.unwrap().unwrap();
            picks.push(assignment.rep.user_id);
        }

        assert_eq!(picks, vec![alice, bob, alice, bob]);
        assert_eq!(store.get_rep(alice).await.unwrap().unwrap().load(), 2);
        assert_eq!(store.get_rep(bob).await.unwrap().unwrap().load(), 2);
    }

    #[tokio::test]
    async fn test_assignment_notifies_rep() {
        let store = MemoryStore::new();
        let rep = add_rep(&store, "alice").await;
        let id = add_prospect(&store, "lead@clinic.com").await;

        AssignmentService::new(&store).assign(id, None).await.unwrap();

        let notifications = store.list_notifications(rep).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, "new_prospect");
        assert!(!notifications[0].is_read);
        assert_eq!(notifications[0].prospect_id, Some(id));
    }

    #[tokio::test]
    async fn test_no_reps_leaves_unassigned() {
        let store = MemoryStore::new();
        let id = add_prospect(&store, "lead@clinic.com").await;

        let result = AssignmentService::new(&store).assign(id, None).await.unwrap();

        assert!(result.is_none());
        let prospect = store.get_prospect(id).await.unwrap().unwrap();
        assert!(prospect.assigned_rep_id.is_none());
    }

    #[tokio::test]
    async fn test_unknown_rep_is_invalid_argument() {
        let store = MemoryStore::new();
        let id = add_prospect(&store, "lead@clinic.com").await;

        let err = AssignmentService::new(&store)
            .assign(id, Some(UserId::generate()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_unknown_prospect_is_not_found() {
        let store = MemoryStore::new();
        let rep = add_rep(&store, "alice").await;

        let err = AssignmentService::new(&store)
            .assign(ProspectId::generate(), Some(rep))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_manual_reassignment() {
        let store = MemoryStore::new();
        let alice = add_rep(&store, "alice").await;
        let bob = add_rep(&store, "bob").await;
        let id = add_prospect(&store, "lead@clinic.com").await;
        let service = AssignmentService::new(&store);

        service.assign(id, Some(alice)).await.unwrap();
        let moved = service.assign(id, Some(bob)).await.unwrap().unwrap();

        assert_eq!(moved.previous_rep_id, Some(alice));
        assert_eq!(moved.prospect.assigned_rep_name.as_deref(), Some("bob Rep"));
        assert_eq!(store.get_rep(alice).await.unwrap().unwrap().load(), 0);
        assert_eq!(store.get_rep(bob).await.unwrap().unwrap().load(), 1);
    }
}
