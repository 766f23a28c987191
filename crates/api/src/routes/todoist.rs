//! Todoist integration: OAuth handshake and task import.
//!
//! The access token never reaches the client. The CSRF state is one-time-use
//! and consumed before its expiry is checked, so a token can never be
//! presented twice regardless of outcome.

use axum::extract::{Extension, Query, State};
use axum::response::Redirect;
use axum::Json;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use pomo_shared::OAuthState;

use crate::auth::AuthUser;
use crate::config::TodoistConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const AUTHORIZE_URL: &str = "https://api.todoist.com/oauth/authorize";
const TOKEN_URL: &str = "https://api.todoist.com/oauth/access_token";
const TASKS_URL: &str = "https://api.todoist.com/api/v1/tasks";

/// CSRF state lifetime.
const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Serialize)]
pub struct OAuthInitResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub content: String,
}

fn todoist_config(state: &AppState) -> ApiResult<&TodoistConfig> {
    state
        .config
        .todoist
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable)
}

/// Generate the authorize URL with a stored one-time CSRF state.
pub async fn oauth_init(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<OAuthInitResponse>> {
    let todoist = todoist_config(&state)?;

    let oauth_state = OAuthState::new(
        &user.uid,
        Duration::minutes(STATE_TTL_MINUTES),
        OffsetDateTime::now_utc(),
    );
    state.store.put_oauth_state(&oauth_state).await?;

    let url = format!(
        "{}?client_id={}&scope=data:read&state={}",
        AUTHORIZE_URL, todoist.client_id, oauth_state.state
    );

    Ok(Json(OAuthInitResponse { url }))
}

fn app_redirect(state: &AppState, outcome: &str) -> Redirect {
    Redirect::to(&format!("{}/?todoist={}", state.config.app_base_url, outcome))
}

fn error_redirect(state: &AppState, reason: &str) -> Redirect {
    app_redirect(state, &format!("error&reason={}", reason))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// OAuth redirect target registered with Todoist. Validates the CSRF state,
/// exchanges the code for a token server-side, and sends the user back to
/// the app. This endpoint is unauthenticated by nature; identity comes from
/// the consumed state.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let todoist = match state.config.todoist.as_ref() {
        Some(todoist) => todoist,
        None => return error_redirect(&state, "not_configured"),
    };

    if let Some(error) = params.error {
        return error_redirect(&state, &error);
    }

    let (Some(code), Some(csrf_state)) = (params.code, params.state) else {
        return error_redirect(&state, "missing_params");
    };

    // Consume the state first; it is gone even if anything below fails.
    let oauth_state = match state.store.take_oauth_state(&csrf_state).await {
        Ok(Some(oauth_state)) => oauth_state,
        Ok(None) => return error_redirect(&state, "invalid_state"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read OAuth state");
            return error_redirect(&state, "internal");
        }
    };

    if oauth_state.is_expired(OffsetDateTime::now_utc()) {
        return error_redirect(&state, "expired");
    }

    let response = state
        .http_client
        .post(TOKEN_URL)
        .form(&[
            ("client_id", todoist.client_id.as_str()),
            ("client_secret", todoist.client_secret.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", todoist.redirect_uri.as_str()),
        ])
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Todoist token exchange request failed");
            return error_redirect(&state, "network_error");
        }
    };

    if !response.status().is_success() {
        tracing::error!(status = %response.status(), "Todoist token exchange failed");
        return error_redirect(&state, "token_exchange_failed");
    }

    let token = match response.json::<TokenResponse>().await {
        Ok(TokenResponse {
            access_token: Some(token),
        }) => token,
        Ok(_) => {
            tracing::error!("Todoist token exchange returned no access token");
            return error_redirect(&state, "no_token");
        }
        Err(e) => {
            tracing::error!(error = %e, "Todoist token response did not parse");
            return error_redirect(&state, "no_token");
        }
    };

    if let Err(e) = state
        .store
        .set_todoist_token(&oauth_state.uid, Some(&token))
        .await
    {
        tracing::error!(uid = %oauth_state.uid, error = %e, "Failed to store Todoist token");
        return error_redirect(&state, "internal");
    }

    tracing::info!(uid = %oauth_state.uid, "Todoist account connected");
    app_redirect(&state, "success")
}

/// Fetch the user's tasks with the stored token. A 401 from Todoist clears
/// the token so the client prompts for a reconnect.
pub async fn import_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<TaskListResponse>> {
    let token = state.store.todoist_token(&user.uid).await?.ok_or_else(|| {
        ApiError::FailedPrecondition(
            "Todoist not connected. Please connect your Todoist account first.".to_string(),
        )
    })?;

    let response = state
        .http_client
        .get(TASKS_URL)
        .bearer_auth(&token)
        .send()
        .await
        .map_err(|e| ApiError::Internal(format!("Todoist request failed: {}", e)))?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
        state.store.set_todoist_token(&user.uid, None).await?;
        return Err(ApiError::Unauthenticated(
            "Todoist token expired or revoked. Please reconnect your Todoist account.".to_string(),
        ));
    }

    if !response.status().is_success() {
        return Err(ApiError::Internal(format!(
            "Todoist API error: {}",
            response.status()
        )));
    }

    let tasks: Vec<TaskItem> = response
        .json()
        .await
        .map_err(|e| ApiError::Internal(format!("Todoist response did not parse: {}", e)))?;

    Ok(Json(TaskListResponse { tasks }))
}
