//! Record store abstraction.
//!
//! The store is a per-user keyed document store with merge-write semantics:
//! a patch only touches the fields it carries. [`MemoryStore`] implements the
//! same contract in memory for tests and local development; the production
//! implementation is [`crate::postgres::PgStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::record::{
    OAuthState, ProcessedEvent, RecordPatch, SubscriptionRecord, UserSessionTotal,
    UserStatsRecord,
};

/// Store-level failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored document is malformed: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed document store for subscription state and its satellites.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the subscription record for a user, if any.
    async fn subscription(&self, uid: &str) -> StoreResult<Option<SubscriptionRecord>>;

    /// Merge a partial write into the user's subscription record, creating
    /// the record if absent. Fields not present in the patch are preserved.
    async fn merge_subscription(&self, uid: &str, patch: &RecordPatch) -> StoreResult<()>;

    /// Atomically record an inbound event id. Returns `true` on first sight
    /// (the caller now owns processing), `false` for any replay.
    async fn admit_event(&self, event: &ProcessedEvent) -> StoreResult<bool>;

    /// Store a one-time OAuth state token.
    async fn put_oauth_state(&self, state: &OAuthState) -> StoreResult<()>;

    /// Consume an OAuth state token. Removes it regardless of what the caller
    /// does next, so a token can never be presented twice.
    async fn take_oauth_state(&self, state: &str) -> StoreResult<Option<OAuthState>>;

    /// Stored Todoist access token for a user.
    async fn todoist_token(&self, uid: &str) -> StoreResult<Option<String>>;

    /// Set or clear the stored Todoist access token.
    async fn set_todoist_token(&self, uid: &str, token: Option<&str>) -> StoreResult<()>;

    /// Per-user completed-session minutes since `since`.
    async fn weekly_session_totals(
        &self,
        since: OffsetDateTime,
    ) -> StoreResult<Vec<UserSessionTotal>>;

    /// Merge-write ranked stats for a batch of users.
    async fn merge_user_stats(&self, stats: &[UserStatsRecord]) -> StoreResult<()>;
}

#[derive(Default)]
struct MemoryInner {
    subscriptions: HashMap<String, Value>,
    events: HashMap<String, ProcessedEvent>,
    oauth_states: HashMap<String, OAuthState>,
    todoist_tokens: HashMap<String, String>,
    sessions: Vec<(String, i64, OffsetDateTime)>,
    stats: HashMap<String, UserStatsRecord>,
}

/// In-memory [`RecordStore`] for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed focus session (the client writes these directly in
    /// production; tests seed them here).
    pub async fn record_session(&self, uid: &str, minutes: i64, at: OffsetDateTime) {
        let mut inner = self.inner.lock().await;
        inner.sessions.push((uid.to_string(), minutes, at));
    }

    /// Ranked stats previously written by `merge_user_stats`.
    pub async fn user_stats(&self, uid: &str) -> Option<UserStatsRecord> {
        self.inner.lock().await.stats.get(uid).cloned()
    }

    /// Raw stored document, for asserting on merge behavior.
    pub async fn raw_subscription(&self, uid: &str) -> Option<Value> {
        self.inner.lock().await.subscriptions.get(uid).cloned()
    }
}

/// Shallow object merge matching the JSONB `||` operator: top-level keys in
/// `patch` overwrite, everything else is preserved.
fn merge_value(existing: &mut Value, patch: Value) {
    match patch {
        Value::Object(fields) => {
            if let Some(target) = existing.as_object_mut() {
                for (key, value) in fields {
                    target.insert(key, value);
                }
            } else {
                *existing = Value::Object(fields);
            }
        }
        other => *existing = other,
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn subscription(&self, uid: &str) -> StoreResult<Option<SubscriptionRecord>> {
        let inner = self.inner.lock().await;
        match inner.subscriptions.get(uid) {
            Some(doc) => Ok(Some(serde_json::from_value(doc.clone())?)),
            None => Ok(None),
        }
    }

    async fn merge_subscription(&self, uid: &str, patch: &RecordPatch) -> StoreResult<()> {
        let patch_value = serde_json::to_value(patch)?;
        let mut inner = self.inner.lock().await;
        let doc = inner
            .subscriptions
            .entry(uid.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        merge_value(doc, patch_value);
        Ok(())
    }

    async fn admit_event(&self, event: &ProcessedEvent) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.events.contains_key(&event.event_id) {
            return Ok(false);
        }
        inner.events.insert(event.event_id.clone(), event.clone());
        Ok(true)
    }

    async fn put_oauth_state(&self, state: &OAuthState) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.oauth_states.insert(state.state.clone(), state.clone());
        Ok(())
    }

    async fn take_oauth_state(&self, state: &str) -> StoreResult<Option<OAuthState>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.oauth_states.remove(state))
    }

    async fn todoist_token(&self, uid: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.todoist_tokens.get(uid).cloned())
    }

    async fn set_todoist_token(&self, uid: &str, token: Option<&str>) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        match token {
            Some(token) => {
                inner.todoist_tokens.insert(uid.to_string(), token.to_string());
            }
            None => {
                inner.todoist_tokens.remove(uid);
            }
        }
        Ok(())
    }

    async fn weekly_session_totals(
        &self,
        since: OffsetDateTime,
    ) -> StoreResult<Vec<UserSessionTotal>> {
        let inner = self.inner.lock().await;
        let mut totals: HashMap<String, i64> = HashMap::new();
        for (uid, minutes, at) in &inner.sessions {
            if *at >= since {
                *totals.entry(uid.clone()).or_default() += minutes;
            }
        }
        Ok(totals
            .into_iter()
            .map(|(uid, weekly_minutes)| UserSessionTotal {
                uid,
                weekly_minutes,
            })
            .collect())
    }

    async fn merge_user_stats(&self, stats: &[UserStatsRecord]) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        for record in stats {
            inner.stats.insert(record.uid.clone(), record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SubscriptionStatus;
    use time::macros::datetime;

    fn now() -> OffsetDateTime {
        datetime!(2026-08-01 12:00 UTC)
    }

    #[tokio::test]
    async fn merge_creates_then_preserves_unrelated_fields() {
        let store = MemoryStore::new();

        let mut first = RecordPatch::stamped(now());
        first.status = Some(SubscriptionStatus::Active);
        first.customer_id = Some("cus_1".to_string());
        first.subscription_id = Some("sub_1".to_string());
        store.merge_subscription("u1", &first).await.unwrap();

        // A later partial write without customerId must not clear it.
        let mut second = RecordPatch::stamped(now());
        second.status = Some(SubscriptionStatus::PastDue);
        store.merge_subscription("u1", &second).await.unwrap();

        let record = store.subscription("u1").await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::PastDue);
        assert_eq!(record.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(record.subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn admit_event_is_first_sight_only() {
        let store = MemoryStore::new();
        let event = ProcessedEvent {
            event_id: "evt_1".to_string(),
            event_type: "checkout.session.completed".to_string(),
            created_at: now(),
        };
        assert!(store.admit_event(&event).await.unwrap());
        assert!(!store.admit_event(&event).await.unwrap());
    }

    #[tokio::test]
    async fn oauth_state_is_single_use() {
        let store = MemoryStore::new();
        let state = OAuthState::new("u1", time::Duration::minutes(10), now());
        store.put_oauth_state(&state).await.unwrap();

        let taken = store.take_oauth_state(&state.state).await.unwrap();
        assert_eq!(taken.map(|s| s.uid), Some("u1".to_string()));

        // Second presentation of the same token finds nothing.
        assert!(store.take_oauth_state(&state.state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn weekly_totals_exclude_old_sessions() {
        let store = MemoryStore::new();
        store.record_session("u1", 25, now()).await;
        store
            .record_session("u1", 50, now() - time::Duration::days(30))
            .await;
        store.record_session("u2", 5, now()).await;

        let mut totals = store
            .weekly_session_totals(now() - time::Duration::days(7))
            .await
            .unwrap();
        totals.sort_by(|a, b| a.uid.cmp(&b.uid));
        assert_eq!(
            totals,
            vec![
                UserSessionTotal { uid: "u1".into(), weekly_minutes: 25 },
                UserSessionTotal { uid: "u2".into(), weekly_minutes: 5 },
            ]
        );
    }
}
