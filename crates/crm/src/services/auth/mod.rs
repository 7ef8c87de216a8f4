//! Authentication service.
//!
//! Provides password login, identity creation and bearer token verification.
//! The role claim lives on the stored user; a token only proves who the
//! caller is, so role changes and deactivation take effect immediately.

mod error;
mod token;

pub use error::AuthError;
pub use token::{TokenClaims, TokenSigner};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;

use cellionyx_core::{Email, Role, UserId};

use crate::db::{RepositoryError, Store};
use crate::models::{CurrentUser, User};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Length of generated temporary passwords.
const TEMPORARY_PASSWORD_LENGTH: usize = 16;

/// A new identity to create.
#[derive(Debug, Clone, Copy)]
pub struct NewIdentity<'r> {
    pub email: &'r str,
    pub password: &'r str,
    pub first_name: &'r str,
    pub last_name: &'r str,
    pub role: Role,
}

/// Authentication service.
///
/// Handles registration, login, and token verification.
pub struct AuthService<'a> {
    store: &'a dyn Store,
    tokens: &'a TokenSigner,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(store: &'a dyn Store, tokens: &'a TokenSigner) -> Self {
        Self { store, tokens }
    }

    /// Create an identity with a role claim and profile.
    ///
    /// Sales reps and country heads also get a sales rep record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn create_identity(&self, identity: NewIdentity<'_>) -> Result<User, AuthError> {
        let email = Email::parse(identity.email)?;
        validate_password(identity.password)?;
        let password_hash = hash_password(identity.password)?;

        let now = Utc::now();
        let user = User {
            id: UserId::generate(),
            email,
            first_name: identity.first_name.trim().to_owned(),
            last_name: identity.last_name.trim().to_owned(),
            role: identity.role,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };

        let user = self
            .store
            .insert_user(user, password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, role = %user.role, "Identity created");
        Ok(user)
    }

    /// Self-service registration. Always creates a Customer-role identity.
    ///
    /// # Errors
    ///
    /// See [`Self::create_identity`].
    pub async fn register_customer(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, AuthError> {
        self.create_identity(NewIdentity {
            email,
            password,
            first_name,
            last_name,
            role: Role::Customer,
        })
        .await
    }

    /// Login with email and password, returning the user and a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    /// Returns `AuthError::Inactive` if the user has been deactivated.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let login = self
            .store
            .find_login(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &login.password_hash)?;

        if !login.user.is_active {
            return Err(AuthError::Inactive);
        }

        let now = Utc::now();
        self.store.record_login(login.user.id, now).await?;

        let mut user = login.user;
        user.last_login = Some(now);
        let token = self.tokens.issue(&user, now)?;

        Ok((user, token))
    }

    /// Resolve a bearer token to the calling user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` or `AuthError::TokenExpired` for a
    /// bad token, `AuthError::Inactive` if the user is gone or deactivated.
    pub async fn verify_token(&self, token: &str) -> Result<CurrentUser, AuthError> {
        let claims = self.tokens.verify(token)?;

        let user = self
            .store
            .get_user(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::Inactive)?;

        Ok(CurrentUser::from(&user))
    }

    /// Change the role claim. Outstanding tokens pick it up on their next
    /// request.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the user does not exist or the
    /// store fails.
    pub async fn set_role(&self, id: UserId, role: Role) -> Result<User, AuthError> {
        let user = self.store.set_user_role(id, role, Utc::now()).await?;
        tracing::info!(user_id = %id, %role, "Role changed");
        Ok(user)
    }
}

/// Validate password meets requirements.
pub(crate) fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// A random alphanumeric password for identities created on someone's behalf.
#[must_use]
pub fn generate_temporary_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TEMPORARY_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}
