//! Customer credit ledger handlers.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Purchase;
use crate::routes::ApiJson;
use crate::services::LedgerService;
use crate::services::ledger::{
    CreditBalance, PurchaseReceipt, PurchaseRequest, UsageReceipt, UseCreditsRequest,
};
use crate::state::AppState;

fn ledger(state: &AppState) -> LedgerService<'_> {
    LedgerService::new(state.store(), state.processor(), state.currency())
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn credits(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CreditBalance>> {
    Ok(Json(ledger(&state).balance(&user).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn purchases(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Purchase>>> {
    Ok(Json(ledger(&state).purchases(&user).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn purchase_credits(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(request): ApiJson<PurchaseRequest>,
) -> Result<Json<PurchaseReceipt>> {
    Ok(Json(ledger(&state).purchase(&user, &request).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn use_credits(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(request): ApiJson<UseCreditsRequest>,
) -> Result<Json<UsageReceipt>> {
    Ok(Json(ledger(&state).use_credits(&user, &request).await?))
}
