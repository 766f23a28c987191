//! Inbound billing event model.
//!
//! Webhook payloads arrive as loosely-shaped JSON. After signature
//! verification they are parsed into [`BillingEvent`], a tagged union over
//! the event kinds this system reconciles; everything else lands in
//! [`EventKind::Unhandled`] and is a logged no-op.

use std::collections::HashMap;

use serde::Deserialize;
use time::OffsetDateTime;

use pomo_shared::{ProcessedEvent, SubscriptionStatus};

use crate::error::{BillingError, BillingResult};
use crate::gateway::{
    CheckoutMode, CheckoutSessionView, PaymentStatus, SubscriptionView, UID_METADATA_KEY,
};

/// A verified inbound event from the billing gateway.
#[derive(Debug, Clone)]
pub struct BillingEvent {
    pub id: String,
    pub event_type: String,
    /// Provider-side creation time, epoch seconds.
    pub created: i64,
    pub kind: EventKind,
}

/// Event kinds with reconciliation semantics.
#[derive(Debug, Clone)]
pub enum EventKind {
    CheckoutCompleted(CheckoutSessionView),
    SubscriptionUpdated(SubscriptionView),
    SubscriptionDeleted(SubscriptionView),
    InvoicePaymentFailed(InvoiceView),
    Unhandled,
}

/// The slice of an invoice payload the reconciler needs.
#[derive(Debug, Clone)]
pub struct InvoiceView {
    pub id: String,
    pub subscription_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: WireEventData,
}

#[derive(Debug, Deserialize)]
struct WireEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireCheckoutSession {
    id: String,
    mode: CheckoutMode,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    payment_status: PaymentStatus,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl From<WireCheckoutSession> for CheckoutSessionView {
    fn from(wire: WireCheckoutSession) -> Self {
        CheckoutSessionView {
            complete: wire.status.as_deref() == Some("complete"),
            id: wire.id,
            mode: wire.mode,
            client_reference_id: wire.client_reference_id,
            subscription_id: wire.subscription,
            payment_intent_id: wire.payment_intent,
            customer_id: wire.customer,
            payment_status: wire.payment_status,
            url: wire.url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSubscription {
    id: String,
    status: String,
    #[serde(default)]
    items: WireList<WireSubscriptionItem>,
    #[serde(default)]
    current_period_end: i64,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WireList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> Default for WireList<T> {
    fn default() -> Self {
        WireList { data: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct WireSubscriptionItem {
    #[serde(default)]
    price: Option<WirePrice>,
}

#[derive(Debug, Deserialize)]
struct WirePrice {
    id: String,
}

impl From<WireSubscription> for SubscriptionView {
    fn from(wire: WireSubscription) -> Self {
        let price_id = wire
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.clone());

        SubscriptionView {
            id: wire.id,
            status: SubscriptionStatus::from_provider(&wire.status),
            price_id,
            current_period_end: wire.current_period_end,
            cancel_at_period_end: wire.cancel_at_period_end,
            customer_id: wire.customer,
            uid: wire.metadata.get(UID_METADATA_KEY).cloned(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireInvoice {
    id: String,
    #[serde(default)]
    subscription: Option<String>,
}

impl BillingEvent {
    /// Parse a verified webhook payload.
    pub fn parse(payload: &str) -> BillingResult<Self> {
        let wire: WireEvent = serde_json::from_str(payload)
            .map_err(|e| BillingError::WebhookPayloadInvalid(e.to_string()))?;

        let kind = match wire.event_type.as_str() {
            "checkout.session.completed" => {
                let session: WireCheckoutSession = parse_object(&wire.data.object)?;
                EventKind::CheckoutCompleted(session.into())
            }
            "customer.subscription.updated" => {
                let subscription: WireSubscription = parse_object(&wire.data.object)?;
                EventKind::SubscriptionUpdated(subscription.into())
            }
            "customer.subscription.deleted" => {
                let subscription: WireSubscription = parse_object(&wire.data.object)?;
                EventKind::SubscriptionDeleted(subscription.into())
            }
            "invoice.payment_failed" => {
                let invoice: WireInvoice = parse_object(&wire.data.object)?;
                EventKind::InvoicePaymentFailed(InvoiceView {
                    id: invoice.id,
                    subscription_id: invoice.subscription,
                })
            }
            _ => EventKind::Unhandled,
        };

        Ok(BillingEvent {
            id: wire.id,
            event_type: wire.event_type,
            created: wire.created,
            kind,
        })
    }

    /// The dedupe tombstone for this event.
    pub fn processed_marker(&self) -> ProcessedEvent {
        ProcessedEvent {
            event_id: self.id.clone(),
            event_type: self.event_type.clone(),
            created_at: OffsetDateTime::from_unix_timestamp(self.created)
                .unwrap_or_else(|_| OffsetDateTime::now_utc()),
        }
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(object: &serde_json::Value) -> BillingResult<T> {
    serde_json::from_value(object.clone())
        .map_err(|e| BillingError::WebhookPayloadInvalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_checkout_completed() {
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "created": 1_722_500_000,
            "data": { "object": {
                "id": "cs_1",
                "object": "checkout.session",
                "mode": "subscription",
                "client_reference_id": "u1",
                "subscription": "sub_1",
                "customer": "cus_1",
                "payment_status": "paid",
                "status": "complete",
            }},
        })
        .to_string();

        let event = BillingEvent::parse(&payload).unwrap();
        assert_eq!(event.id, "evt_1");
        match event.kind {
            EventKind::CheckoutCompleted(session) => {
                assert_eq!(session.mode, CheckoutMode::Subscription);
                assert_eq!(session.client_reference_id.as_deref(), Some("u1"));
                assert_eq!(session.subscription_id.as_deref(), Some("sub_1"));
                assert_eq!(session.customer_id.as_deref(), Some("cus_1"));
                assert!(session.complete);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn parses_subscription_updated_with_metadata_uid() {
        let payload = serde_json::json!({
            "id": "evt_2",
            "type": "customer.subscription.updated",
            "created": 1_722_500_000,
            "data": { "object": {
                "id": "sub_1",
                "object": "subscription",
                "status": "past_due",
                "items": { "data": [ { "price": { "id": "price_monthly_499" } } ] },
                "current_period_end": 1_725_000_000,
                "cancel_at_period_end": false,
                "customer": "cus_1",
                "metadata": { "app_uid": "u1" },
            }},
        })
        .to_string();

        let event = BillingEvent::parse(&payload).unwrap();
        match event.kind {
            EventKind::SubscriptionUpdated(sub) => {
                assert_eq!(sub.status, SubscriptionStatus::PastDue);
                assert_eq!(sub.uid.as_deref(), Some("u1"));
                assert_eq!(sub.price_id.as_deref(), Some("price_monthly_499"));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn unknown_event_type_is_unhandled() {
        let payload = serde_json::json!({
            "id": "evt_3",
            "type": "customer.created",
            "created": 1_722_500_000,
            "data": { "object": { "id": "cus_1" } },
        })
        .to_string();

        let event = BillingEvent::parse(&payload).unwrap();
        assert!(matches!(event.kind, EventKind::Unhandled));
        assert_eq!(event.event_type, "customer.created");
    }

    #[test]
    fn subscription_without_items_parses_with_null_price() {
        let payload = serde_json::json!({
            "id": "evt_4",
            "type": "customer.subscription.deleted",
            "created": 1_722_500_000,
            "data": { "object": {
                "id": "sub_1",
                "status": "canceled",
                "metadata": { "app_uid": "u1" },
            }},
        })
        .to_string();

        let event = BillingEvent::parse(&payload).unwrap();
        match event.kind {
            EventKind::SubscriptionDeleted(sub) => {
                assert_eq!(sub.status, SubscriptionStatus::Canceled);
                assert!(sub.price_id.is_none());
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }
}
