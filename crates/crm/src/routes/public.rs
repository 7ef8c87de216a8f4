//! Unauthenticated form endpoints used by the marketing site.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::error::Result;
use crate::routes::ApiJson;
use crate::services::careers::{ApplicationReceipt, CareerForm};
use crate::services::intake::{ProspectForm, SubmissionReceipt};
use crate::services::{CareerService, IntakeService};
use crate::state::AppState;

/// Lead intake. A repeat email updates the existing prospect.
#[instrument(skip_all)]
pub async fn submit_form(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<ProspectForm>,
) -> Result<Json<SubmissionReceipt>> {
    let receipt = IntakeService::new(state.store(), state.mailer())
        .submit(&form)
        .await?;
    Ok(Json(receipt))
}

/// Career application.
#[instrument(skip_all)]
pub async fn submit_career(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<CareerForm>,
) -> Result<Json<ApplicationReceipt>> {
    let receipt = CareerService::new(state.store(), state.mailer())
        .submit(&form)
        .await?;
    Ok(Json(receipt))
}
