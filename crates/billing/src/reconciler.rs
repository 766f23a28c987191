//! Subscription reconciler.
//!
//! Maps gateway events and objects onto the canonical per-user subscription
//! record. Every write is a merge: each event carries a partial view of
//! subscription truth, and fields set by earlier events must survive later
//! events that do not re-send them.
//!
//! A missing cross-reference (user id, subscription id) means the event is
//! permanently malformed, not transiently broken: it is logged and dropped,
//! never retried. Gateway failures propagate to the caller.

use std::sync::Arc;

use time::OffsetDateTime;

use pomo_shared::{RecordPatch, RecordStore, SubscriptionStatus};

use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEvent, EventKind, InvoiceView};
use crate::gateway::{BillingGateway, CheckoutMode, CheckoutSessionView, SubscriptionView};

/// Pure mapping from a gateway subscription object to the record fields it
/// describes. Shared by the webhook, pull-sync, and self-healing paths so the
/// three cannot drift.
pub fn subscription_patch(subscription: &SubscriptionView, now: OffsetDateTime) -> RecordPatch {
    RecordPatch {
        status: Some(subscription.status),
        price_id: Some(subscription.price_id.clone()),
        current_period_end: Some(subscription.current_period_end),
        cancel_at_period_end: Some(subscription.cancel_at_period_end),
        updated_at: Some(now),
        ..Default::default()
    }
}

/// Pure mapping for a completed one-time payment.
pub fn lifetime_patch(
    payment_intent_id: Option<&str>,
    customer_id: Option<&str>,
    now: OffsetDateTime,
) -> RecordPatch {
    RecordPatch {
        status: Some(SubscriptionStatus::Lifetime),
        payment_intent_id: payment_intent_id.map(str::to_string),
        customer_id: customer_id.map(str::to_string),
        updated_at: Some(now),
        ..Default::default()
    }
}

#[derive(Clone)]
pub struct Reconciler {
    gateway: Arc<dyn BillingGateway>,
    store: Arc<dyn RecordStore>,
}

impl Reconciler {
    pub fn new(gateway: Arc<dyn BillingGateway>, store: Arc<dyn RecordStore>) -> Self {
        Self { gateway, store }
    }

    /// Apply one admitted event to the record store.
    pub async fn reconcile(&self, event: &BillingEvent) -> BillingResult<()> {
        match &event.kind {
            EventKind::CheckoutCompleted(session) => self.on_checkout_completed(session).await,
            EventKind::SubscriptionUpdated(subscription) => {
                self.on_subscription_updated(subscription).await
            }
            EventKind::SubscriptionDeleted(subscription) => {
                self.on_subscription_deleted(subscription).await
            }
            EventKind::InvoicePaymentFailed(invoice) => {
                self.on_invoice_payment_failed(invoice).await
            }
            EventKind::Unhandled => {
                tracing::info!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "Unhandled billing event type - no handler configured"
                );
                Ok(())
            }
        }
    }

    /// Apply a completed checkout session to a user's record.
    ///
    /// Shared by the webhook branch and the client-triggered sync path, which
    /// performs its own authorization before calling in. Returns the status
    /// the record now describes.
    pub async fn apply_checkout_session(
        &self,
        uid: &str,
        session: &CheckoutSessionView,
    ) -> BillingResult<SubscriptionStatus> {
        let now = OffsetDateTime::now_utc();

        match session.mode {
            CheckoutMode::Subscription => {
                let subscription_id = session.subscription_id.as_deref().ok_or_else(|| {
                    BillingError::FailedPrecondition(
                        "checkout session has no subscription".to_string(),
                    )
                })?;

                let subscription = self.gateway.retrieve_subscription(subscription_id).await?;

                let mut patch = subscription_patch(&subscription, now);
                patch.subscription_id = Some(subscription_id.to_string());
                patch.customer_id = session.customer_id.clone();
                self.store.merge_subscription(uid, &patch).await?;

                tracing::info!(
                    uid = %uid,
                    subscription_id = %subscription_id,
                    status = %subscription.status,
                    "Subscription recorded from checkout session"
                );

                Ok(subscription.status)
            }
            CheckoutMode::Payment => {
                let patch = lifetime_patch(
                    session.payment_intent_id.as_deref(),
                    session.customer_id.as_deref(),
                    now,
                );
                self.store.merge_subscription(uid, &patch).await?;

                tracing::info!(uid = %uid, "Lifetime purchase recorded");
                Ok(SubscriptionStatus::Lifetime)
            }
            CheckoutMode::Setup => Ok(SubscriptionStatus::None),
        }
    }

    async fn on_checkout_completed(&self, session: &CheckoutSessionView) -> BillingResult<()> {
        let Some(uid) = session.client_reference_id.clone() else {
            tracing::warn!(
                session_id = %session.id,
                "checkout.session.completed without client reference id, dropping"
            );
            return Ok(());
        };

        if session.mode == CheckoutMode::Subscription && session.subscription_id.is_none() {
            tracing::warn!(
                session_id = %session.id,
                "checkout.session.completed without subscription reference, dropping"
            );
            return Ok(());
        }

        self.apply_checkout_session(&uid, session).await?;
        Ok(())
    }

    async fn on_subscription_updated(&self, subscription: &SubscriptionView) -> BillingResult<()> {
        let Some(uid) = subscription.uid.as_deref() else {
            tracing::warn!(
                subscription_id = %subscription.id,
                "customer.subscription.updated without user metadata, dropping"
            );
            return Ok(());
        };

        // Deletion is terminal per subscription id: a late-arriving update for
        // an already-canceled subscription must not resurrect it. A different
        // subscription id is a new subscription and applies normally.
        if subscription.status != SubscriptionStatus::Canceled {
            if let Some(existing) = self.store.subscription(uid).await? {
                if existing.status == SubscriptionStatus::Canceled
                    && existing.subscription_id.as_deref() == Some(subscription.id.as_str())
                {
                    tracing::warn!(
                        uid = %uid,
                        subscription_id = %subscription.id,
                        "Update for already-canceled subscription, dropping"
                    );
                    return Ok(());
                }
            }
        }

        let patch = subscription_patch(subscription, OffsetDateTime::now_utc());
        self.store.merge_subscription(uid, &patch).await?;

        tracing::info!(
            uid = %uid,
            subscription_id = %subscription.id,
            status = %subscription.status,
            "Subscription updated"
        );

        Ok(())
    }

    async fn on_subscription_deleted(&self, subscription: &SubscriptionView) -> BillingResult<()> {
        let Some(uid) = subscription.uid.as_deref() else {
            tracing::warn!(
                subscription_id = %subscription.id,
                "customer.subscription.deleted without user metadata, dropping"
            );
            return Ok(());
        };

        let now = OffsetDateTime::now_utc();
        let patch = RecordPatch {
            status: Some(SubscriptionStatus::Canceled),
            canceled_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        self.store.merge_subscription(uid, &patch).await?;

        tracing::info!(
            uid = %uid,
            subscription_id = %subscription.id,
            "Subscription canceled"
        );

        Ok(())
    }

    async fn on_invoice_payment_failed(&self, invoice: &InvoiceView) -> BillingResult<()> {
        let Some(subscription_id) = invoice.subscription_id.as_deref() else {
            tracing::warn!(
                invoice_id = %invoice.id,
                "invoice.payment_failed without subscription reference, dropping"
            );
            return Ok(());
        };

        // The invoice itself carries no user linkage; the parent subscription
        // holds the metadata.
        let subscription = self.gateway.retrieve_subscription(subscription_id).await?;

        let Some(uid) = subscription.uid.as_deref() else {
            tracing::warn!(
                subscription_id = %subscription_id,
                "invoice.payment_failed subscription has no user metadata, dropping"
            );
            return Ok(());
        };

        let now = OffsetDateTime::now_utc();
        let patch = RecordPatch {
            status: Some(subscription.status),
            last_payment_error: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        self.store.merge_subscription(uid, &patch).await?;

        tracing::warn!(
            uid = %uid,
            subscription_id = %subscription_id,
            status = %subscription.status,
            "Payment failed"
        );

        Ok(())
    }
}
