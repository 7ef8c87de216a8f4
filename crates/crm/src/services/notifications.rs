//! In-app notifications for portal staff.

use cellionyx_core::NotificationId;

use crate::db::{RepositoryError, Store};
use crate::error::{AppError, Result};
use crate::models::{CurrentUser, Notification};

pub struct NotificationService<'a> {
    store: &'a dyn Store,
}

impl<'a> NotificationService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// The caller's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn list(&self, caller: &CurrentUser) -> Result<Vec<Notification>> {
        Ok(self.store.list_notifications(caller.id).await?)
    }

    /// Mark one of the caller's notifications read.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` unless the notification belongs to the caller.
    pub async fn mark_read(&self, caller: &CurrentUser, id: NotificationId) -> Result<Notification> {
        self.store
            .mark_notification_read(id, caller.id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AppError::NotFound("Notification not found".to_owned()),
                other => other.into(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use cellionyx_core::{Email, ProspectId, Role, UserId};

    use super::*;
    use crate::db::ActivityStore;
    use crate::db::MemoryStore;

    fn caller() -> CurrentUser {
        CurrentUser {
            id: UserId::generate(),
            email: Email::parse("rita@cellionyx.com").unwrap(),
            role: Role::SalesRep,
            first_name: "Rita".to_owned(),
            last_name: "Rep".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_mark_read_only_own() {
        let store = MemoryStore::new();
        let owner = caller();
        let stranger = caller();
        let notification =
            Notification::new_prospect(owner.id, ProspectId::generate(), "Ada Byron", Utc::now());
        let id = notification.id;
        store.insert_notification(notification).await.unwrap();
        let service = NotificationService::new(&store);

        assert!(matches!(
            service.mark_read(&stranger, id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(service.mark_read(&owner, id).await.unwrap().is_read);
        assert!(service.list(&owner).await.unwrap()[0].is_read);
        assert!(service.list(&stranger).await.unwrap().is_empty());
    }
}
