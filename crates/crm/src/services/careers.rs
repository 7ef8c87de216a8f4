//! Career applications.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use cellionyx_core::{ApplicationId, Email};

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{CareerApplication, CurrentUser};
use crate::services::email::Mailer;
use crate::services::intake::non_empty;
use crate::services::policy::{self, Capability};

pub const APPLICATION_RECEIVED_MESSAGE: &str = "Thank you for your interest in Cellionyx! We'll review your application and get back to you soon.";

/// Body of `POST /public/submit-career`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareerForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub introduction: Option<String>,
    pub interest: Option<String>,
    pub position: Option<String>,
    pub resume_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationReceipt {
    pub success: bool,
    pub message: &'static str,
    pub application_id: ApplicationId,
}

pub struct CareerService<'a> {
    store: &'a dyn Store,
    mailer: &'a dyn Mailer,
}

impl<'a> CareerService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, mailer: &'a dyn Mailer) -> Self {
        Self { store, mailer }
    }

    /// Store an application and tell the careers inbox.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a required field is missing or the
    /// email is malformed.
    #[tracing::instrument(skip(self, form))]
    pub async fn submit(&self, form: &CareerForm) -> Result<ApplicationReceipt> {
        let required = (
            non_empty(form.first_name.as_ref()),
            non_empty(form.last_name.as_ref()),
            non_empty(form.email.as_ref()),
            non_empty(form.introduction.as_ref()),
            non_empty(form.interest.as_ref()),
            non_empty(form.position.as_ref()),
        );
        let (
            Some(first_name),
            Some(last_name),
            Some(email),
            Some(introduction),
            Some(interest),
            Some(position),
        ) = required
        else {
            return Err(AppError::missing_fields(
                "firstName, lastName, email, introduction, interest, and position are required",
            ));
        };
        let email = Email::parse(&email).map_err(|_| AppError::Validation {
            error: "Invalid email address".to_owned(),
            details: email.clone(),
        })?;

        let application = self
            .store
            .insert_application(CareerApplication {
                id: ApplicationId::generate(),
                first_name,
                last_name,
                email,
                phone: non_empty(form.phone.as_ref()),
                introduction,
                interest,
                position,
                resume_url: non_empty(form.resume_url.as_ref()),
                status: CareerApplication::STATUS_NEW.to_owned(),
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(application_id = %application.id, position = %application.position, "Career application received");

        if let Err(e) = self.mailer.send_career_application(&application).await {
            tracing::warn!(application_id = %application.id, error = %e, "Failed to send application email");
        }

        Ok(ApplicationReceipt {
            success: true,
            message: APPLICATION_RECEIVED_MESSAGE,
            application_id: application.id,
        })
    }

    /// All applications, newest first.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for non-admins.
    pub async fn list(&self, caller: &CurrentUser) -> Result<Vec<CareerApplication>> {
        policy::require(caller, Capability::ViewApplications)?;
        Ok(self.store.list_applications().await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cellionyx_core::{Role, UserId};

    use super::*;
    use crate::db::{CareerStore, MemoryStore};
    use crate::services::email::NoopMailer;

    fn form() -> CareerForm {
        CareerForm {
            first_name: Some("Grace".to_owned()),
            last_name: Some("Hopper".to_owned()),
            email: Some("grace@example.com".to_owned()),
            phone: Some(String::new()),
            introduction: Some("Field engineer".to_owned()),
            interest: Some("Regenerative devices".to_owned()),
            position: Some("Clinical Specialist".to_owned()),
            resume_url: None,
        }
    }

    fn caller(role: Role) -> CurrentUser {
        CurrentUser {
            id: UserId::generate(),
            email: Email::parse("staff@cellionyx.com").unwrap(),
            role,
            first_name: "Staff".to_owned(),
            last_name: "Member".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_submit_stores_new_application() {
        let store = MemoryStore::new();
        let receipt = CareerService::new(&store, &NoopMailer)
            .submit(&form())
            .await
            .unwrap();

        assert_eq!(receipt.message, APPLICATION_RECEIVED_MESSAGE);
        let stored = store.list_applications().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, receipt.application_id);
        assert_eq!(stored[0].status, "New");
        assert!(stored[0].phone.is_none());
    }

    #[tokio::test]
    async fn test_missing_field_rejected() {
        let store = MemoryStore::new();
        let mut incomplete = form();
        incomplete.interest = Some("  ".to_owned());

        let err = CareerService::new(&store, &NoopMailer)
            .submit(&incomplete)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { error, .. } if error == "Missing required fields"));
        assert!(store.list_applications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_is_admin_only() {
        let store = MemoryStore::new();
        let service = CareerService::new(&store, &NoopMailer);
        service.submit(&form()).await.unwrap();

        assert_eq!(service.list(&caller(Role::Admin)).await.unwrap().len(), 1);
        assert!(matches!(
            service.list(&caller(Role::CountryHead)).await,
            Err(AppError::PermissionDenied(_))
        ));
    }
}
