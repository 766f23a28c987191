//! Billing routes: checkout, portal, cancellation, sync, verification.

use axum::extract::{Extension, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use pomo_billing::{AccessDecision, CancelOutcome};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request to create a checkout session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub price_id: String,
    /// "subscription" or "payment".
    pub mode: String,
}

/// Response carrying a redirect URL.
#[derive(Debug, Serialize)]
pub struct RedirectResponse {
    pub url: String,
}

/// Request to sync from a completed checkout session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckoutRequest {
    pub session_id: String,
}

/// Response from a checkout sync.
#[derive(Debug, Serialize)]
pub struct SyncCheckoutResponse {
    pub status: String,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<RedirectResponse>> {
    let url = state
        .billing
        .checkout
        .create_session(
            &user.uid,
            user.email.as_deref(),
            &request.price_id,
            &request.mode,
        )
        .await?;

    Ok(Json(RedirectResponse { url }))
}

pub async fn create_portal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<RedirectResponse>> {
    let url = state.billing.portal.create_session(&user.uid).await?;
    Ok(Json(RedirectResponse { url }))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<CancelOutcome>> {
    let outcome = state.billing.subscriptions.cancel(&user.uid).await?;
    Ok(Json(outcome))
}

pub async fn sync_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SyncCheckoutRequest>,
) -> ApiResult<Json<SyncCheckoutResponse>> {
    if request.session_id.is_empty() {
        return Err(ApiError::InvalidArgument("missing sessionId".to_string()));
    }

    let status = state
        .billing
        .subscriptions
        .sync_from_session(&user.uid, &request.session_id)
        .await?;

    Ok(Json(SyncCheckoutResponse {
        status: status.to_string(),
    }))
}

pub async fn verify_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<AccessDecision>> {
    let decision = state
        .billing
        .verify
        .verify(&user.uid, user.email.as_deref())
        .await?;

    Ok(Json(decision))
}
