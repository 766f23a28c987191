//! Access evaluation: pure derivation of a client-facing decision from a
//! stored subscription record. No I/O.

use serde::Serialize;

use pomo_shared::{SubscriptionRecord, SubscriptionStatus, Tier};

/// Statuses that grant access. `past_due` keeps access as a grace period
/// while the provider retries payment.
pub const PREMIUM_STATUSES: [SubscriptionStatus; 4] = [
    SubscriptionStatus::Active,
    SubscriptionStatus::Trialing,
    SubscriptionStatus::PastDue,
    SubscriptionStatus::Lifetime,
];

/// Client-facing access decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub has_access: bool,
    pub status: SubscriptionStatus,
    pub tier: Option<Tier>,
    pub grace_period: bool,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
}

impl AccessDecision {
    /// The no-access decision for users without any billing state.
    pub fn none() -> Self {
        AccessDecision {
            has_access: false,
            status: SubscriptionStatus::None,
            tier: None,
            grace_period: false,
            current_period_end: None,
            cancel_at_period_end: false,
        }
    }
}

/// Derive the access decision for a stored record.
pub fn derive_access(record: &SubscriptionRecord) -> AccessDecision {
    AccessDecision {
        has_access: PREMIUM_STATUSES.contains(&record.status),
        status: record.status,
        tier: derive_tier(record.status, record.price_id.as_deref()),
        grace_period: record.status == SubscriptionStatus::PastDue,
        current_period_end: record.current_period_end,
        cancel_at_period_end: record.cancel_at_period_end,
    }
}

/// Tier derivation: lifetime wins outright; otherwise the price id decides
/// between monthly and yearly billing.
pub fn derive_tier(status: SubscriptionStatus, price_id: Option<&str>) -> Option<Tier> {
    if status == SubscriptionStatus::Lifetime {
        return Some(Tier::Lifetime);
    }
    match price_id {
        Some(price_id) if price_id.contains("monthly") => Some(Tier::Monthly),
        Some(_) => Some(Tier::Yearly),
        None => None,
    }
}
