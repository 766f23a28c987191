//! HTTP routes.

pub mod billing;
pub mod todoist;
pub mod webhooks;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::auth_middleware;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    // Everything behind the auth middleware requires a signed-in caller.
    let authenticated = Router::new()
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/portal", post(billing::create_portal))
        .route("/billing/cancel", post(billing::cancel_subscription))
        .route("/billing/sync-checkout", post(billing::sync_checkout))
        .route("/billing/verify", post(billing::verify_subscription))
        .route("/todoist/oauth/init", post(todoist::oauth_init))
        .route("/todoist/tasks", post(todoist::import_tasks))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/todoist/oauth/callback", get(todoist::oauth_callback))
        .merge(authenticated)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
