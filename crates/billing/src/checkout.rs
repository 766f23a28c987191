//! Checkout session creation.

use std::sync::Arc;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{BillingGateway, CheckoutMode, NewCheckoutSession};

/// Free-trial length for recurring subscriptions, in days. One-time
/// (lifetime) purchases charge immediately.
pub const SUBSCRIPTION_TRIAL_DAYS: u32 = 7;

pub struct CheckoutService {
    gateway: Arc<dyn BillingGateway>,
    success_url: String,
    cancel_url: String,
}

impl CheckoutService {
    pub fn new(gateway: Arc<dyn BillingGateway>, success_url: String, cancel_url: String) -> Self {
        Self {
            gateway,
            success_url,
            cancel_url,
        }
    }

    /// Create a checkout session and return its redirect URL.
    ///
    /// Input is validated before any gateway traffic.
    pub async fn create_session(
        &self,
        uid: &str,
        email: Option<&str>,
        price_id: &str,
        mode: &str,
    ) -> BillingResult<String> {
        let mode = match mode {
            "subscription" => CheckoutMode::Subscription,
            "payment" => CheckoutMode::Payment,
            other => {
                return Err(BillingError::InvalidArgument(format!(
                    "invalid mode {:?}, must be \"subscription\" or \"payment\"",
                    other
                )))
            }
        };

        if !price_id.starts_with("price_") {
            return Err(BillingError::InvalidArgument(
                "invalid priceId, must be a price id starting with \"price_\"".to_string(),
            ));
        }

        let params = NewCheckoutSession {
            mode,
            price_id: price_id.to_string(),
            uid: uid.to_string(),
            customer_email: email.map(str::to_string),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            trial_period_days: (mode == CheckoutMode::Subscription)
                .then_some(SUBSCRIPTION_TRIAL_DAYS),
        };

        let session = self.gateway.create_checkout_session(&params).await?;

        tracing::info!(
            uid = %uid,
            session_id = %session.id,
            mode = ?mode,
            "Created checkout session"
        );

        session
            .url
            .ok_or_else(|| BillingError::Gateway("checkout session has no redirect url".to_string()))
    }
}
