//! Admin handlers. The services reject non-admin callers.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use cellionyx_core::{ProspectId, Role, UserId};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{CareerApplication, Prospect, User};
use crate::routes::ApiJson;
use crate::routes::reps::Ack;
use crate::services::analytics::Analytics;
use crate::services::performance::RefreshSummary;
use crate::services::policy::{self, Capability};
use crate::services::users::{CreateUserRequest, UserCreated};
use crate::services::{
    AnalyticsService, AssignmentService, CareerService, PerformanceService, ProspectService,
    UserService,
};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
    pub role: Role,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    /// Least-loaded active rep when absent.
    pub rep_id: Option<UserId>,
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_users(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<UserList>> {
    let users = UserService::new(state.store(), state.tokens())
        .list(&user)
        .await?;
    Ok(Json(UserList { users }))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_user(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserCreated>)> {
    let created = UserService::new(state.store(), state.tokens())
        .create(&user, &request)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip_all, fields(user_id = %user.id, target_id = %id))]
pub async fn set_user_status(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<UserId>,
    ApiJson(body): ApiJson<StatusBody>,
) -> Result<Json<Ack>> {
    UserService::new(state.store(), state.tokens())
        .set_active(&user, id, body.is_active)
        .await?;
    Ok(Json(Ack {
        success: true,
        message: "User status updated",
    }))
}

#[instrument(skip_all, fields(user_id = %user.id, target_id = %id))]
pub async fn set_user_role(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<UserId>,
    ApiJson(body): ApiJson<RoleBody>,
) -> Result<Json<User>> {
    Ok(Json(
        UserService::new(state.store(), state.tokens())
            .set_role(&user, id, body.role)
            .await?,
    ))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn analytics(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Analytics>> {
    Ok(Json(AnalyticsService::new(state.store()).dashboard(&user).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn refresh_performance(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<RefreshSummary>> {
    Ok(Json(PerformanceService::new(state.store()).refresh(&user).await?))
}

/// Manual triage. The body is optional; without a `repId` the
/// least-loaded active rep is chosen.
#[instrument(skip_all, fields(user_id = %user.id, prospect_id = %id))]
pub async fn assign_prospect(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProspectId>,
    body: Bytes,
) -> Result<Json<Prospect>> {
    policy::require(&user, Capability::AssignProspects)?;
    let body: AssignBody = if body.is_empty() {
        AssignBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::Validation {
            error: "Invalid request body".to_owned(),
            details: e.to_string(),
        })?
    };
    let rep = body.rep_id;
    let assignment = AssignmentService::new(state.store())
        .assign(id, rep)
        .await?
        .ok_or_else(|| AppError::FailedPrecondition("No active sales reps".to_owned()))?;
    Ok(Json(assignment.prospect))
}

#[instrument(skip_all, fields(user_id = %user.id, prospect_id = %id))]
pub async fn delete_prospect(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProspectId>,
) -> Result<StatusCode> {
    ProspectService::new(state.store()).delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn career_applications(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<CareerApplication>>> {
    Ok(Json(
        CareerService::new(state.store(), state.mailer())
            .list(&user)
            .await?,
    ))
}
