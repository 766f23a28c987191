//! Webhook signature verification and event intake.
//!
//! Verification happens before the payload is trusted at all: the signature
//! header carries a timestamp and an HMAC-SHA256 of `"{timestamp}.{payload}"`
//! keyed by the endpoint secret. Unsigned, mis-signed, or stale requests are
//! rejected and never reach the reconciler.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{BillingError, BillingResult};
use crate::events::BillingEvent;
use crate::ledger::EventLedger;
use crate::reconciler::Reconciler;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed payload, in seconds.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify a webhook signature header against the payload.
///
/// The header format is `t=<timestamp>,v1=<hex signature>[,v0=..]`.
pub fn verify_signature(payload: &str, signature: &str, secret: &str) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        tracing::error!("Missing timestamp in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let v1_signature = v1_signature.ok_or_else(|| {
        tracing::error!("Missing v1 signature in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| {
            tracing::error!("System time error: {}", e);
            BillingError::WebhookSignatureInvalid
        })?
        .as_secs() as i64;

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::error!(
            timestamp = timestamp,
            now = now,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    // The secret's "whsec_" prefix is not part of the key material.
    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
        tracing::error!("Invalid webhook secret key");
        BillingError::WebhookSignatureInvalid
    })?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        tracing::error!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

/// Webhook intake: verification, dedupe, reconciliation.
pub struct WebhookHandler {
    webhook_secret: String,
    ledger: EventLedger,
    reconciler: Reconciler,
}

impl WebhookHandler {
    pub fn new(webhook_secret: String, ledger: EventLedger, reconciler: Reconciler) -> Self {
        Self {
            webhook_secret,
            ledger,
            reconciler,
        }
    }

    /// Verify the signature and parse the payload into a typed event.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<BillingEvent> {
        verify_signature(payload, signature, &self.webhook_secret)?;
        BillingEvent::parse(payload)
    }

    /// Claim the event id. `false` means a replay: already processed or
    /// currently in flight elsewhere.
    pub async fn admit(&self, event: &BillingEvent) -> BillingResult<bool> {
        self.ledger.admit(event).await
    }

    /// Reconcile an admitted event. On the webhook path this runs after the
    /// gateway has been acknowledged, so the caller logs failures instead of
    /// surfacing them.
    pub async fn process(&self, event: &BillingEvent) -> BillingResult<()> {
        self.reconciler.reconcile(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &str, secret: &str, timestamp: i64) -> String {
        let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn unix_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    #[test]
    fn accepts_correctly_signed_payload() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, "whsec_testsecret", unix_now());
        assert!(verify_signature(payload, &header, "whsec_testsecret").is_ok());
    }

    #[test]
    fn rejects_tampered_payload() {
        let header = sign(r#"{"id":"evt_1"}"#, "whsec_testsecret", unix_now());
        let result = verify_signature(r#"{"id":"evt_2"}"#, &header, "whsec_testsecret");
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, "whsec_testsecret", unix_now());
        let result = verify_signature(payload, &header, "whsec_othersecret");
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, "whsec_testsecret", unix_now() - 3600);
        let result = verify_signature(payload, &header, "whsec_testsecret");
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn rejects_header_without_signature() {
        let result = verify_signature("{}", "t=123", "whsec_testsecret");
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }
}
