//! Billing error types.

use pomo_shared::StoreError;

/// Errors surfaced by billing operations.
///
/// The first four variants are the caller-facing taxonomy; everything else is
/// internal detail that the API layer logs and collapses into a generic
/// internal error.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Malformed input, rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required piece of state is missing (no record, no customer id).
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The caller is not allowed to act on this resource.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Webhook signature did not verify; the payload is untrusted.
    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    /// Webhook payload did not parse after a valid signature.
    #[error("malformed webhook payload: {0}")]
    WebhookPayloadInvalid(String),

    /// Billing gateway rejected a call or returned an unusable object.
    #[error("billing gateway error: {0}")]
    Gateway(String),

    #[error("stripe api error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type BillingResult<T> = Result<T, BillingError>;
