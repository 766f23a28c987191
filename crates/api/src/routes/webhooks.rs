//! Stripe webhook endpoint.
//!
//! Two-phase discipline: verify the signature and admit the event, then
//! acknowledge with 200 immediately and reconcile in a spawned task. The
//! gateway enforces a response-time timeout; a slow acknowledgment reads as
//! failure and triggers redundant redelivery. Reconciliation failures after
//! the acknowledgment are logged, never surfaced; the gateway's own
//! redelivery and the self-healing verify path provide eventual convergence.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::InvalidArgument("missing stripe-signature header".to_string())
        })?;

    let event = state
        .billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Stripe webhook rejected before processing");
            ApiError::from(e)
        })?;

    // Admission failure here means we have not acknowledged yet; surfacing
    // the error lets the gateway redeliver.
    if !state.billing.webhooks.admit(&event).await? {
        return Ok(StatusCode::OK);
    }

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Stripe webhook event admitted"
    );

    let billing = state.billing.clone();
    tokio::spawn(async move {
        if let Err(e) = billing.webhooks.process(&event).await {
            tracing::error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Webhook reconciliation failed after acknowledgment"
            );
        }
    });

    Ok(StatusCode::OK)
}
