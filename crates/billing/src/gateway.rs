//! Billing gateway abstraction.
//!
//! The payments provider is an opaque remote collaborator. Everything the
//! rest of the crate needs from it is expressed through [`BillingGateway`]
//! and a handful of provider-neutral view types, so the reconciler, the
//! pull-path synchronizer, and the self-healing resolver all consume the same
//! shapes whether an object arrived over a webhook or a live API call.

use async_trait::async_trait;
use serde::Deserialize;

use pomo_shared::SubscriptionStatus;

use crate::error::BillingResult;

/// Metadata key linking gateway objects back to the app user that created
/// them. Written at checkout time, read by every metadata-based resolution.
pub const UID_METADATA_KEY: &str = "app_uid";

/// Checkout session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Subscription,
    Payment,
    Setup,
}

/// Payment state of a checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

/// Provider-neutral view of a subscription object.
#[derive(Debug, Clone)]
pub struct SubscriptionView {
    pub id: String,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    /// Epoch seconds.
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
    pub customer_id: Option<String>,
    /// App user id from the metadata attached at creation time.
    pub uid: Option<String>,
}

/// Provider-neutral view of a checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionView {
    pub id: String,
    pub mode: CheckoutMode,
    /// The app user id embedded when the session was created.
    pub client_reference_id: Option<String>,
    pub subscription_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub customer_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub complete: bool,
    pub url: Option<String>,
}

/// Provider-neutral view of a billing customer.
#[derive(Debug, Clone)]
pub struct CustomerView {
    pub id: String,
    pub email: Option<String>,
}

/// Parameters for a new checkout session.
#[derive(Debug, Clone)]
pub struct NewCheckoutSession {
    pub mode: CheckoutMode,
    pub price_id: String,
    pub uid: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub trial_period_days: Option<u32>,
}

/// The remote payments provider.
///
/// All calls are synchronous point-to-point requests with no internal retry
/// loop; transient failure surfaces as an error to the caller.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        params: &NewCheckoutSession,
    ) -> BillingResult<CheckoutSessionView>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> BillingResult<CheckoutSessionView>;

    /// Most recent checkout sessions for a customer, newest first.
    async fn recent_checkout_sessions(
        &self,
        customer_id: &str,
        limit: u64,
    ) -> BillingResult<Vec<CheckoutSessionView>>;

    async fn retrieve_subscription(&self, subscription_id: &str)
        -> BillingResult<SubscriptionView>;

    /// The customer's most recent subscription in any status, if one exists.
    async fn latest_subscription_for_customer(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<SubscriptionView>>;

    async fn find_customer_by_email(&self, email: &str) -> BillingResult<Option<CustomerView>>;

    /// Set or clear deferred cancellation and return the updated view.
    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> BillingResult<SubscriptionView>;

    /// Create a billing portal session and return its redirect URL.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> BillingResult<String>;
}
