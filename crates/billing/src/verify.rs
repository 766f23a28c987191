//! Verification with self-healing backfill.
//!
//! The record store is a cache of the gateway's truth. A hit answers from the
//! store alone, with no gateway traffic. A miss searches the gateway by
//! customer email and repairs the store on the way out, so a user who has
//! genuinely paid is never permanently locked out by a lost webhook.

use std::sync::Arc;

use time::OffsetDateTime;

use pomo_shared::{RecordStore, SubscriptionRecord, SubscriptionStatus};

use crate::access::{derive_access, AccessDecision};
use crate::error::BillingResult;
use crate::gateway::{BillingGateway, CheckoutMode, PaymentStatus};
use crate::reconciler::{lifetime_patch, subscription_patch};

/// How many recent checkout sessions to inspect for a one-time purchase.
const LIFETIME_SEARCH_LIMIT: u64 = 5;

pub struct VerifyService {
    gateway: Arc<dyn BillingGateway>,
    store: Arc<dyn RecordStore>,
}

impl VerifyService {
    pub fn new(gateway: Arc<dyn BillingGateway>, store: Arc<dyn RecordStore>) -> Self {
        Self { gateway, store }
    }

    /// Resolve the access decision for a user.
    pub async fn verify(&self, uid: &str, email: Option<&str>) -> BillingResult<AccessDecision> {
        if let Some(record) = self.store.subscription(uid).await? {
            return Ok(derive_access(&record));
        }

        let Some(email) = email else {
            return Ok(AccessDecision::none());
        };

        match self.backfill_from_gateway(uid, email).await {
            Ok(Some(decision)) => Ok(decision),
            Ok(None) => Ok(AccessDecision::none()),
            Err(e) => {
                // Best-effort repair: the record stays missing and remains
                // repairable on a later call.
                tracing::error!(
                    uid = %uid,
                    error = %e,
                    "Gateway search during verification failed"
                );
                Ok(AccessDecision::none())
            }
        }
    }

    async fn backfill_from_gateway(
        &self,
        uid: &str,
        email: &str,
    ) -> BillingResult<Option<AccessDecision>> {
        let Some(customer) = self.gateway.find_customer_by_email(email).await? else {
            return Ok(None);
        };

        let now = OffsetDateTime::now_utc();

        if let Some(subscription) = self
            .gateway
            .latest_subscription_for_customer(&customer.id)
            .await?
        {
            let mut patch = subscription_patch(&subscription, now);
            patch.subscription_id = Some(subscription.id.clone());
            patch.customer_id = Some(customer.id.clone());
            self.store.merge_subscription(uid, &patch).await?;

            tracing::info!(
                uid = %uid,
                subscription_id = %subscription.id,
                "Backfilled subscription record from gateway"
            );

            let record = SubscriptionRecord {
                status: subscription.status,
                subscription_id: Some(subscription.id),
                price_id: subscription.price_id,
                customer_id: Some(customer.id),
                current_period_end: Some(subscription.current_period_end),
                cancel_at_period_end: subscription.cancel_at_period_end,
                payment_intent_id: None,
                canceled_at: None,
                last_payment_error: None,
                updated_at: now,
            };
            return Ok(Some(derive_access(&record)));
        }

        // No subscription: look for a completed one-time payment.
        let sessions = self
            .gateway
            .recent_checkout_sessions(&customer.id, LIFETIME_SEARCH_LIMIT)
            .await?;

        if let Some(session) = sessions
            .iter()
            .find(|s| s.mode == CheckoutMode::Payment && s.payment_status == PaymentStatus::Paid)
        {
            let patch = lifetime_patch(
                session.payment_intent_id.as_deref(),
                Some(&customer.id),
                now,
            );
            self.store.merge_subscription(uid, &patch).await?;

            tracing::info!(uid = %uid, "Backfilled lifetime purchase from gateway");

            let record = SubscriptionRecord {
                status: SubscriptionStatus::Lifetime,
                subscription_id: None,
                price_id: None,
                customer_id: Some(customer.id),
                current_period_end: None,
                cancel_at_period_end: false,
                payment_intent_id: session.payment_intent_id.clone(),
                canceled_at: None,
                last_payment_error: None,
                updated_at: now,
            };
            return Ok(Some(derive_access(&record)));
        }

        Ok(None)
    }
}
