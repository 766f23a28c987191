// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pomo Billing Module
//!
//! Synchronizes billing state between the payments provider and the per-user
//! subscription record store.
//!
//! ## Features
//!
//! - **Webhooks**: signature-verified intake with at-most-once admission
//! - **Reconciliation**: gateway events merged into the canonical record
//! - **Checkout & Portal**: session creation for purchase and self-service
//! - **Cancellation**: deferred cancel-at-period-end with optimistic update
//! - **Verification**: access decisions with self-healing backfill on miss

pub mod access;
pub mod checkout;
pub mod client;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ledger;
pub mod portal;
pub mod reconciler;
pub mod subscriptions;
pub mod verify;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testutil;

// Access
pub use access::{derive_access, derive_tier, AccessDecision, PREMIUM_STATUSES};

// Checkout
pub use checkout::{CheckoutService, SUBSCRIPTION_TRIAL_DAYS};

// Client
pub use client::{StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{BillingEvent, EventKind, InvoiceView};

// Gateway
pub use gateway::{
    BillingGateway, CheckoutMode, CheckoutSessionView, CustomerView, NewCheckoutSession,
    PaymentStatus, SubscriptionView, UID_METADATA_KEY,
};

// Ledger
pub use ledger::EventLedger;

// Portal
pub use portal::PortalService;

// Reconciler
pub use reconciler::{lifetime_patch, subscription_patch, Reconciler};

// Subscriptions
pub use subscriptions::{CancelOutcome, SubscriptionService};

// Verify
pub use verify::VerifyService;

// Webhook
pub use webhook::{verify_signature, WebhookHandler};

use std::sync::Arc;

use pomo_shared::RecordStore;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub subscriptions: SubscriptionService,
    pub verify: VerifyService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a billing service from environment variables.
    pub fn from_env(store: Arc<dyn RecordStore>) -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        let gateway: Arc<dyn BillingGateway> = Arc::new(StripeClient::new(config.clone()));
        Ok(Self::new(gateway, store, config))
    }

    /// Create a billing service with an explicit gateway and config.
    pub fn new(
        gateway: Arc<dyn BillingGateway>,
        store: Arc<dyn RecordStore>,
        config: StripeConfig,
    ) -> Self {
        let reconciler = Reconciler::new(gateway.clone(), store.clone());
        let ledger = EventLedger::new(store.clone());

        Self {
            checkout: CheckoutService::new(
                gateway.clone(),
                config.success_url.clone(),
                config.cancel_url.clone(),
            ),
            portal: PortalService::new(
                gateway.clone(),
                store.clone(),
                config.portal_return_url.clone(),
            ),
            subscriptions: SubscriptionService::new(gateway.clone(), store.clone()),
            verify: VerifyService::new(gateway, store),
            webhooks: WebhookHandler::new(config.webhook_secret, ledger, reconciler),
        }
    }
}
