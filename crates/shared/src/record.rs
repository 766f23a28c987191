//! Domain types for the per-user subscription document and its satellites.
//!
//! The subscription record is stored as a JSON document and only ever written
//! through merge patches, so every field that an event may omit must survive
//! a partial write untouched.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Canonical subscription lifecycle state.
///
/// Provider statuses outside this set (`unpaid`, `incomplete`,
/// `incomplete_expired`, `paused`) map to [`SubscriptionStatus::None`]: they
/// confer no access and have no canonical meaning here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Lifetime,
    #[default]
    None,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Lifetime => "lifetime",
            SubscriptionStatus::None => "none",
        }
    }

    /// Map a provider-reported status string onto the canonical set.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::None,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client-facing access tier derived from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Monthly,
    Yearly,
    Lifetime,
}

/// The single per-user subscription snapshot.
///
/// Field names follow the stored document format (camelCase). A record is
/// never deleted, only merged over; `updated_at` is last-writer-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    #[serde(default)]
    pub status: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// May be stored as an explicit null when the provider sent a
    /// subscription without a price.
    #[serde(default)]
    pub price_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    /// Epoch seconds, as the provider reports period boundaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// Set only for one-time (lifetime) purchases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub canceled_at: Option<OffsetDateTime>,
    /// Timestamp of the last observed payment failure.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_payment_error: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339",
        default = "OffsetDateTime::now_utc"
    )]
    pub updated_at: OffsetDateTime,
}

/// Partial write to a [`SubscriptionRecord`].
///
/// Unset fields are omitted from the serialized patch and therefore preserved
/// by the store's merge. `price_id` is double-optional: `Some(None)` writes an
/// explicit null over any previously stored price.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_at_period_end: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub canceled_at: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_payment_error: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl RecordPatch {
    /// Patch carrying only a write timestamp, to be extended by the caller.
    pub fn stamped(now: OffsetDateTime) -> Self {
        RecordPatch {
            updated_at: Some(now),
            ..Default::default()
        }
    }
}

/// Permanent dedupe tombstone for an inbound billing event.
///
/// Created exactly once at first sight of an event id, never updated, never
/// deleted. Existence is the idempotency guard.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub created_at: OffsetDateTime,
}

/// One-time-use CSRF state for the Todoist OAuth handshake.
#[derive(Debug, Clone)]
pub struct OAuthState {
    pub state: String,
    pub uid: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl OAuthState {
    pub fn new(uid: &str, ttl: Duration, now: OffsetDateTime) -> Self {
        OAuthState {
            state: Uuid::new_v4().to_string(),
            uid: uid.to_string(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}

/// Weekly completed-session minutes for one user, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSessionTotal {
    pub uid: String,
    pub weekly_minutes: i64,
}

/// Ranked weekly stats for one user, as written by the aggregation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStatsRecord {
    pub uid: String,
    pub weekly_minutes: i64,
    /// 0 = top of the leaderboard.
    pub percentile: i32,
    pub rank: i64,
    pub total_users: i64,
    pub last_updated: OffsetDateTime,
}
