//! API error taxonomy.
//!
//! Callers see exactly one of the taxonomy statuses. Internal failures are
//! logged with full context and collapsed into a generic body; gateway and
//! store detail never leaks to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use pomo_billing::BillingError;
use pomo_shared::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No caller identity. Rejected before any I/O.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Malformed input shape. Rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Required state is missing, discovered after a read.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Caller does not own the resource. Never silently fixed.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A required integration is not configured on this deployment.
    #[error("service unavailable")]
    ServiceUnavailable,

    /// Gateway or store failure; detail goes to the log, not the client.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
            BillingError::FailedPrecondition(msg) => ApiError::FailedPrecondition(msg),
            BillingError::PermissionDenied(msg) => ApiError::PermissionDenied(msg),
            BillingError::WebhookSignatureInvalid => {
                ApiError::InvalidArgument("invalid webhook signature".to_string())
            }
            BillingError::WebhookPayloadInvalid(msg) => ApiError::InvalidArgument(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::FailedPrecondition(msg) => (StatusCode::PRECONDITION_FAILED, msg.clone()),
            ApiError::PermissionDenied(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service unavailable".to_string(),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_taxonomy_maps_onto_statuses() {
        let cases = [
            (
                ApiError::from(BillingError::InvalidArgument("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(BillingError::FailedPrecondition("x".into())),
                StatusCode::PRECONDITION_FAILED,
            ),
            (
                ApiError::from(BillingError::PermissionDenied("x".into())),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(BillingError::Gateway("secret detail".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
