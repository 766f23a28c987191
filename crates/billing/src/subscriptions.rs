//! Subscription management: deferred cancellation and the client-triggered
//! checkout sync fallback.

use std::sync::Arc;

use time::OffsetDateTime;

use pomo_shared::{RecordPatch, RecordStore, SubscriptionStatus};

use crate::error::{BillingError, BillingResult};
use crate::gateway::{BillingGateway, CheckoutMode, PaymentStatus};
use crate::reconciler::Reconciler;

/// Result of a cancellation request.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<i64>,
}

pub struct SubscriptionService {
    gateway: Arc<dyn BillingGateway>,
    store: Arc<dyn RecordStore>,
    reconciler: Reconciler,
}

impl SubscriptionService {
    pub fn new(gateway: Arc<dyn BillingGateway>, store: Arc<dyn RecordStore>) -> Self {
        let reconciler = Reconciler::new(gateway.clone(), store.clone());
        Self {
            gateway,
            store,
            reconciler,
        }
    }

    /// Cancel at period end, keeping access until the billing cycle closes.
    ///
    /// The record is updated optimistically; the authoritative state arrives
    /// with the next `customer.subscription.updated` webhook.
    pub async fn cancel(&self, uid: &str) -> BillingResult<CancelOutcome> {
        let record = self.store.subscription(uid).await?.ok_or_else(|| {
            BillingError::FailedPrecondition("no active subscription found".to_string())
        })?;

        let subscription_id = record.subscription_id.ok_or_else(|| {
            BillingError::FailedPrecondition("no subscription id on record".to_string())
        })?;

        let updated = self
            .gateway
            .set_cancel_at_period_end(&subscription_id, true)
            .await?;

        let mut patch = RecordPatch::stamped(OffsetDateTime::now_utc());
        patch.cancel_at_period_end = Some(true);
        self.store.merge_subscription(uid, &patch).await?;

        tracing::info!(
            uid = %uid,
            subscription_id = %subscription_id,
            "Subscription set to cancel at period end"
        );

        Ok(CancelOutcome {
            cancel_at_period_end: updated.cancel_at_period_end,
            current_period_end: Some(updated.current_period_end),
        })
    }

    /// Sync the record from a completed checkout session.
    ///
    /// Fallback for the gap between the post-checkout redirect and webhook
    /// delivery. The session must belong to the caller; a mismatch is a
    /// permission error, never silently fixed.
    pub async fn sync_from_session(
        &self,
        uid: &str,
        session_id: &str,
    ) -> BillingResult<SubscriptionStatus> {
        let session = self.gateway.retrieve_checkout_session(session_id).await?;

        if session.client_reference_id.as_deref() != Some(uid) {
            return Err(BillingError::PermissionDenied(
                "checkout session does not belong to this user".to_string(),
            ));
        }

        if session.payment_status == PaymentStatus::Unpaid
            && session.mode != CheckoutMode::Subscription
        {
            return Err(BillingError::FailedPrecondition(
                "payment not completed".to_string(),
            ));
        }

        self.reconciler.apply_checkout_session(uid, &session).await
    }
}
