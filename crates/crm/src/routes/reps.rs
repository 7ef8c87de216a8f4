//! Sales portal handlers.
//!
//! Every handler authenticates the caller; the services apply the role
//! policy.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use cellionyx_core::{AppointmentId, AppointmentStatus, NotificationId, ProspectId};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{Activity, Notification, Prospect};
use crate::routes::ApiJson;
use crate::services::appointments::{AppointmentSummary, ScheduleRequest};
use crate::services::conversion::{ConvertRequest, ConvertResponse};
use crate::services::intake::ProspectForm;
use crate::services::prospects::{LogActivityRequest, ProspectQuery, ProspectSummary};
use crate::services::{
    AppointmentService, ConversionService, NotificationService, ProspectService,
};
use crate::state::AppState;

/// Plain success acknowledgement.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProspectBody {
    /// Passed through to the activity log verbatim.
    pub updates: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduled {
    pub success: bool,
    pub appointment_id: AppointmentId,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentStatusBody {
    pub status: AppointmentStatus,
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn my_prospects(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<ProspectQuery>,
) -> Result<Json<Vec<ProspectSummary>>> {
    let prospects = ProspectService::new(state.store()).list(&user, query).await?;
    Ok(Json(prospects.into_iter().map(Into::into).collect()))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_prospect(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(form): ApiJson<ProspectForm>,
) -> Result<(StatusCode, Json<Prospect>)> {
    let prospect = ProspectService::new(state.store())
        .create(&user, &form)
        .await?;
    Ok((StatusCode::CREATED, Json(prospect)))
}

#[instrument(skip_all, fields(user_id = %user.id, prospect_id = %id))]
pub async fn get_prospect(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProspectId>,
) -> Result<Json<Prospect>> {
    Ok(Json(ProspectService::new(state.store()).get(&user, id).await?))
}

#[instrument(skip_all, fields(user_id = %user.id, prospect_id = %id))]
pub async fn update_prospect(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProspectId>,
    ApiJson(body): ApiJson<UpdateProspectBody>,
) -> Result<Json<Prospect>> {
    let prospect = ProspectService::new(state.store())
        .update(&user, id, body.updates)
        .await?;
    Ok(Json(prospect))
}

#[instrument(skip_all, fields(user_id = %user.id, prospect_id = %id))]
pub async fn prospect_activities(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProspectId>,
) -> Result<Json<Vec<Activity>>> {
    Ok(Json(
        ProspectService::new(state.store())
            .activities(&user, id)
            .await?,
    ))
}

#[instrument(skip_all, fields(user_id = %user.id, prospect_id = %id))]
pub async fn convert_prospect(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProspectId>,
    ApiJson(request): ApiJson<ConvertRequest>,
) -> Result<(StatusCode, Json<ConvertResponse>)> {
    let response = ConversionService::new(state.store())
        .convert(&user, id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn log_activity(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(request): ApiJson<LogActivityRequest>,
) -> Result<Json<Ack>> {
    ProspectService::new(state.store())
        .log_activity(&user, &request)
        .await?;
    Ok(Json(Ack {
        success: true,
        message: "Activity logged successfully",
    }))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn my_appointments(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<AppointmentSummary>>> {
    let appointments = AppointmentService::new(state.store()).list(&user).await?;
    Ok(Json(appointments.into_iter().map(Into::into).collect()))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn schedule_appointment(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(request): ApiJson<ScheduleRequest>,
) -> Result<Json<Scheduled>> {
    let appointment = AppointmentService::new(state.store())
        .schedule(&user, &request)
        .await?;
    Ok(Json(Scheduled {
        success: true,
        appointment_id: appointment.id,
        message: "Appointment scheduled successfully",
    }))
}

#[instrument(skip_all, fields(user_id = %user.id, appointment_id = %id))]
pub async fn update_appointment(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AppointmentId>,
    ApiJson(body): ApiJson<AppointmentStatusBody>,
) -> Result<Json<AppointmentSummary>> {
    let appointment = AppointmentService::new(state.store())
        .set_status(&user, id, body.status)
        .await?;
    Ok(Json(appointment.into()))
}

pub async fn notifications(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Notification>>> {
    Ok(Json(NotificationService::new(state.store()).list(&user).await?))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<NotificationId>,
) -> Result<Json<Notification>> {
    Ok(Json(
        NotificationService::new(state.store())
            .mark_read(&user, id)
            .await?,
    ))
}
