//! User administration.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use cellionyx_core::{Role, UserId};

use crate::db::{RepositoryError, Store};
use crate::error::{AppError, Result};
use crate::models::{CurrentUser, User};
use crate::services::auth::{AuthError, AuthService, NewIdentity, TokenSigner};
use crate::services::policy::{self, Capability};

/// Body of `POST /admin/users`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreated {
    pub success: bool,
    pub message: &'static str,
    pub user_id: UserId,
}

/// Admin-only user management.
pub struct UserService<'a> {
    store: &'a dyn Store,
    tokens: &'a TokenSigner,
}

impl<'a> UserService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, tokens: &'a TokenSigner) -> Self {
        Self { store, tokens }
    }

    /// Every user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for non-admins.
    pub async fn list(&self, caller: &CurrentUser) -> Result<Vec<User>> {
        policy::require(caller, Capability::ManageUsers)?;
        let mut users = self.store.list_users().await?;
        users.reverse();
        Ok(users)
    }

    /// Create a user with any role.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for non-admins, or the identity errors of
    /// [`AuthService::create_identity`].
    #[tracing::instrument(skip(self, caller, request), fields(admin_id = %caller.id, role = %request.role))]
    pub async fn create(
        &self,
        caller: &CurrentUser,
        request: &CreateUserRequest,
    ) -> Result<UserCreated> {
        policy::require(caller, Capability::ManageUsers)?;
        if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
            return Err(AppError::missing_fields(
                "email, password, firstName, lastName, and role are required",
            ));
        }

        let user = AuthService::new(self.store, self.tokens)
            .create_identity(NewIdentity {
                email: &request.email,
                password: &request.password,
                first_name: &request.first_name,
                last_name: &request.last_name,
                role: request.role,
            })
            .await?;

        Ok(UserCreated {
            success: true,
            message: "User created successfully",
            user_id: user.id,
        })
    }

    /// Activate or deactivate a user. Deactivated reps stop receiving
    /// assignments and their tokens stop working.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for non-admins and `NotFound` for an
    /// unknown user.
    #[tracing::instrument(skip(self, caller), fields(admin_id = %caller.id))]
    pub async fn set_active(&self, caller: &CurrentUser, id: UserId, active: bool) -> Result<User> {
        policy::require(caller, Capability::ManageUsers)?;
        let user = self
            .store
            .set_user_active(id, active, Utc::now())
            .await
            .map_err(user_not_found)?;
        tracing::info!(user_id = %id, active, "User status updated");
        Ok(user)
    }

    /// Change a user's role.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` for non-admins and `NotFound` for an
    /// unknown user.
    pub async fn set_role(&self, caller: &CurrentUser, id: UserId, role: Role) -> Result<User> {
        policy::require(caller, Capability::ManageUsers)?;
        AuthService::new(self.store, self.tokens)
            .set_role(id, role)
            .await
            .map_err(|e| match e {
                AuthError::Repository(err) => user_not_found(err),
                other => other.into(),
            })
    }
}

fn user_not_found(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("User not found".to_owned()),
        other => other.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use cellionyx_core::Email;
    use secrecy::SecretString;

    use super::*;
    use crate::db::{MemoryStore, UserStore};

    fn signer() -> TokenSigner {
        TokenSigner::new(
            SecretString::from("k3y-for-user-admin-tests-0123456789abcdef"),
            Duration::from_secs(3600),
        )
    }

    fn admin() -> CurrentUser {
        CurrentUser {
            id: UserId::generate(),
            email: Email::parse("root@cellionyx.com").unwrap(),
            role: Role::Admin,
            first_name: "Root".to_owned(),
            last_name: "Admin".to_owned(),
        }
    }

    fn request(email: &str, role: Role) -> CreateUserRequest {
        CreateUserRequest {
            email: email.to_owned(),
            password: "correct-horse-battery".to_owned(),
            first_name: "Sam".to_owned(),
            last_name: "Seller".to_owned(),
            role,
        }
    }

    #[tokio::test]
    async fn test_create_rep_gets_rep_record() {
        let store = MemoryStore::new();
        let tokens = signer();
        let service = UserService::new(&store, &tokens);

        let created = service
            .create(&admin(), &request("sam@cellionyx.com", Role::SalesRep))
            .await
            .unwrap();

        assert_eq!(created.message, "User created successfully");
        let rep = store.get_rep(created.user_id).await.unwrap().unwrap();
        assert!(rep.is_active);
        assert!(!rep.is_country_head);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        let tokens = signer();
        let service = UserService::new(&store, &tokens);

        service
            .create(&admin(), &request("sam@cellionyx.com", Role::SalesRep))
            .await
            .unwrap();
        let err = service
            .create(&admin(), &request("sam@cellionyx.com", Role::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::UserAlreadyExists)));
    }

    #[tokio::test]
    async fn test_deactivation_mirrors_rep_record() {
        let store = MemoryStore::new();
        let tokens = signer();
        let service = UserService::new(&store, &tokens);
        let created = service
            .create(&admin(), &request("sam@cellionyx.com", Role::SalesRep))
            .await
            .unwrap();

        let user = service
            .set_active(&admin(), created.user_id, false)
            .await
            .unwrap();

        assert!(!user.is_active);
        assert!(!store.get_rep(created.user_id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_unknown_user_not_found() {
        let store = MemoryStore::new();
        let tokens = signer();
        let service = UserService::new(&store, &tokens);

        assert!(matches!(
            service.set_active(&admin(), UserId::generate(), false).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service
                .set_role(&admin(), UserId::generate(), Role::Admin)
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_newest_first_and_admin_only() {
        let store = MemoryStore::new();
        let tokens = signer();
        let service = UserService::new(&store, &tokens);
        service
            .create(&admin(), &request("first@cellionyx.com", Role::SalesRep))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        service
            .create(&admin(), &request("second@cellionyx.com", Role::Customer))
            .await
            .unwrap();

        let users = service.list(&admin()).await.unwrap();
        assert_eq!(users[0].email.as_str(), "second@cellionyx.com");

        let mut rep = admin();
        rep.role = Role::SalesRep;
        assert!(matches!(
            service.list(&rep).await,
            Err(AppError::PermissionDenied(_))
        ));
    }
}
