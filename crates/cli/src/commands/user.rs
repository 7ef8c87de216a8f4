//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! # Bootstrap the first administrator
//! crm-cli user create -e admin@cellionyx.com -p 'Str0ng-Passw0rd' \
//!     --first-name Ada --last-name Admin -r Admin
//! ```
//!
//! # Environment Variables
//!
//! - `CRM_DATABASE_URL` - `PostgreSQL` connection string
//! - `CRM_TOKEN_SECRET` - Same secret the server signs tokens with

use std::time::Duration;

use cellionyx_core::{Role, UserId};
use cellionyx_crm::services::AuthService;
use cellionyx_crm::services::TokenSigner;
use cellionyx_crm::services::auth::NewIdentity;
use secrecy::SecretString;

use super::{CommandError, connect};

/// Fields for a new portal user.
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub role: Role,
}

/// Create a portal user with the given role.
///
/// This is the only way to create the first `Admin`; after that admins
/// manage users through the API.
///
/// # Returns
///
/// The ID of the created user.
pub async fn create(user: NewUser<'_>) -> Result<UserId, CommandError> {
    let store = connect().await?;

    let secret = std::env::var("CRM_TOKEN_SECRET")
        .map_err(|_| CommandError::MissingEnvVar("CRM_TOKEN_SECRET"))?;
    let tokens = TokenSigner::new(SecretString::from(secret), Duration::from_secs(60));

    tracing::info!("Creating user: {} ({})", user.email, user.role);

    let created = AuthService::new(&store, &tokens)
        .create_identity(NewIdentity {
            email: user.email,
            password: user.password,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
        })
        .await
        .map_err(|e| CommandError::Crm(e.to_string()))?;

    tracing::info!(
        "User created successfully! ID: {}, Email: {}, Role: {}",
        created.id,
        created.email,
        created.role
    );
    Ok(created.id)
}
