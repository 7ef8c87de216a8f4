//! Registration and login.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use cellionyx_core::{Email, Role, UserId};

use crate::error::{AppError, Result};
use crate::models::CurrentUser;
use crate::routes::ApiJson;
use crate::services::AuthService;
use crate::services::intake::non_empty;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub success: bool,
    pub message: &'static str,
    pub user_id: UserId,
    pub email: Email,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoggedIn {
    pub message: &'static str,
    pub token: String,
    pub user: CurrentUser,
}

/// Self-service registration. Always creates a customer; staff accounts are
/// created by an admin.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<RegisterForm>,
) -> Result<(StatusCode, Json<Registered>)> {
    let (Some(email), Some(password), Some(first_name), Some(last_name)) = (
        non_empty(form.email.as_ref()),
        form.password.filter(|p| !p.is_empty()),
        non_empty(form.first_name.as_ref()),
        non_empty(form.last_name.as_ref()),
    ) else {
        return Err(AppError::missing_fields(
            "email, password, firstName, and lastName are required",
        ));
    };

    let user = AuthService::new(state.store(), state.tokens())
        .register_customer(&email, &password, &first_name, &last_name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Registered {
            success: true,
            message: "User created successfully",
            user_id: user.id,
            email: user.email,
            role: user.role,
        }),
    ))
}

/// Password login. Returns a bearer token for the `Authorization` header.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<LoginForm>,
) -> Result<Json<LoggedIn>> {
    let (user, token) = AuthService::new(state.store(), state.tokens())
        .login(&form.email, &form.password)
        .await?;

    Ok(Json(LoggedIn {
        message: "Login successful",
        token,
        user: CurrentUser::from(&user),
    }))
}
