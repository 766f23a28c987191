//! Shared test doubles for the billing crate.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use pomo_shared::SubscriptionStatus;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{
    BillingGateway, CheckoutMode, CheckoutSessionView, CustomerView, NewCheckoutSession,
    PaymentStatus, SubscriptionView,
};

/// Scripted in-memory gateway. Every trait call increments the call counter,
/// which tests use to assert "zero gateway calls" properties.
#[derive(Default)]
pub struct FakeGateway {
    subscriptions: HashMap<String, SubscriptionView>,
    customers_by_email: HashMap<String, CustomerView>,
    latest_subscription: HashMap<String, SubscriptionView>,
    checkout_sessions: HashMap<String, CheckoutSessionView>,
    recent_sessions: HashMap<String, Vec<CheckoutSessionView>>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway where every call errors, for degraded-path tests.
    pub fn failing() -> Self {
        FakeGateway {
            fail: true,
            ..Default::default()
        }
    }

    pub fn with_subscription(mut self, subscription: SubscriptionView) -> Self {
        self.subscriptions
            .insert(subscription.id.clone(), subscription);
        self
    }

    pub fn with_customer(mut self, email: &str, customer_id: &str) -> Self {
        self.customers_by_email.insert(
            email.to_string(),
            CustomerView {
                id: customer_id.to_string(),
                email: Some(email.to_string()),
            },
        );
        self
    }

    pub fn with_latest_subscription(
        mut self,
        customer_id: &str,
        subscription: SubscriptionView,
    ) -> Self {
        self.latest_subscription
            .insert(customer_id.to_string(), subscription);
        self
    }

    pub fn with_checkout_session(mut self, session: CheckoutSessionView) -> Self {
        self.checkout_sessions.insert(session.id.clone(), session);
        self
    }

    pub fn with_recent_sessions(
        mut self,
        customer_id: &str,
        sessions: Vec<CheckoutSessionView>,
    ) -> Self {
        self.recent_sessions
            .insert(customer_id.to_string(), sessions);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) -> BillingResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BillingError::Gateway("simulated gateway outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        params: &NewCheckoutSession,
    ) -> BillingResult<CheckoutSessionView> {
        self.tick()?;
        Ok(CheckoutSessionView {
            id: "cs_fake".to_string(),
            mode: params.mode,
            client_reference_id: Some(params.uid.clone()),
            subscription_id: None,
            payment_intent_id: None,
            customer_id: None,
            payment_status: PaymentStatus::Unpaid,
            complete: false,
            url: Some("https://checkout.test/cs_fake".to_string()),
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> BillingResult<CheckoutSessionView> {
        self.tick()?;
        self.checkout_sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| BillingError::Gateway(format!("no such session: {}", session_id)))
    }

    async fn recent_checkout_sessions(
        &self,
        customer_id: &str,
        limit: u64,
    ) -> BillingResult<Vec<CheckoutSessionView>> {
        self.tick()?;
        let sessions = self
            .recent_sessions
            .get(customer_id)
            .cloned()
            .unwrap_or_default();
        Ok(sessions.into_iter().take(limit as usize).collect())
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<SubscriptionView> {
        self.tick()?;
        self.subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| {
                BillingError::Gateway(format!("no such subscription: {}", subscription_id))
            })
    }

    async fn latest_subscription_for_customer(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<SubscriptionView>> {
        self.tick()?;
        Ok(self.latest_subscription.get(customer_id).cloned())
    }

    async fn find_customer_by_email(&self, email: &str) -> BillingResult<Option<CustomerView>> {
        self.tick()?;
        Ok(self.customers_by_email.get(email).cloned())
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> BillingResult<SubscriptionView> {
        self.tick()?;
        let mut subscription = self
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| {
                BillingError::Gateway(format!("no such subscription: {}", subscription_id))
            })?;
        subscription.cancel_at_period_end = cancel;
        Ok(subscription)
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        _return_url: &str,
    ) -> BillingResult<String> {
        self.tick()?;
        Ok(format!("https://portal.test/{}", customer_id))
    }
}

pub fn sub_view(
    id: &str,
    status: SubscriptionStatus,
    price_id: Option<&str>,
    uid: Option<&str>,
) -> SubscriptionView {
    SubscriptionView {
        id: id.to_string(),
        status,
        price_id: price_id.map(str::to_string),
        current_period_end: 1_725_000_000,
        cancel_at_period_end: false,
        customer_id: Some("cus_1".to_string()),
        uid: uid.map(str::to_string),
    }
}

pub fn checkout_session_view(
    id: &str,
    mode: CheckoutMode,
    client_reference_id: Option<&str>,
    subscription_id: Option<&str>,
    payment_status: PaymentStatus,
) -> CheckoutSessionView {
    CheckoutSessionView {
        id: id.to_string(),
        mode,
        client_reference_id: client_reference_id.map(str::to_string),
        subscription_id: subscription_id.map(str::to_string),
        payment_intent_id: Some("pi_1".to_string()),
        customer_id: Some("cus_1".to_string()),
        payment_status,
        complete: true,
        url: None,
    }
}

/// Build a valid `Stripe-Signature` header for a payload.
pub fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> String {
    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}
