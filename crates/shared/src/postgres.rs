//! Postgres-backed [`RecordStore`].
//!
//! Subscription records live in a JSONB column and are written with the `||`
//! merge operator, so a patch only touches the keys it carries. Event
//! admission is a plain `INSERT .. ON CONFLICT DO NOTHING`: the insert either
//! claims the event id or observes the tombstone, with no window in between.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::record::{
    OAuthState, ProcessedEvent, RecordPatch, SubscriptionRecord, UserSessionTotal,
    UserStatsRecord,
};
use crate::store::{RecordStore, StoreResult};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn subscription(&self, uid: &str) -> StoreResult<Option<SubscriptionRecord>> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT record FROM subscription_records WHERE uid = $1")
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((doc,)) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    async fn merge_subscription(&self, uid: &str, patch: &RecordPatch) -> StoreResult<()> {
        let patch_value = serde_json::to_value(patch)?;

        sqlx::query(
            r#"
            INSERT INTO subscription_records (uid, record, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (uid) DO UPDATE SET
                record = subscription_records.record || EXCLUDED.record,
                updated_at = NOW()
            "#,
        )
        .bind(uid)
        .bind(patch_value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn admit_event(&self, event: &ProcessedEvent) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn put_oauth_state(&self, state: &OAuthState) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_states (state, uid, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&state.state)
        .bind(&state.uid)
        .bind(state.created_at)
        .bind(state.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_oauth_state(&self, state: &str) -> StoreResult<Option<OAuthState>> {
        let row: Option<(String, OffsetDateTime, OffsetDateTime)> = sqlx::query_as(
            r#"
            DELETE FROM oauth_states WHERE state = $1
            RETURNING uid, created_at, expires_at
            "#,
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(uid, created_at, expires_at)| OAuthState {
            state: state.to_string(),
            uid,
            created_at,
            expires_at,
        }))
    }

    async fn todoist_token(&self, uid: &str) -> StoreResult<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT todoist_token FROM user_integrations WHERE uid = $1")
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(token,)| token))
    }

    async fn set_todoist_token(&self, uid: &str, token: Option<&str>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_integrations (uid, todoist_token, todoist_connected_at)
            VALUES ($1, $2, CASE WHEN $2 IS NULL THEN NULL ELSE NOW() END)
            ON CONFLICT (uid) DO UPDATE SET
                todoist_token = EXCLUDED.todoist_token,
                todoist_connected_at = EXCLUDED.todoist_connected_at
            "#,
        )
        .bind(uid)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn weekly_session_totals(
        &self,
        since: OffsetDateTime,
    ) -> StoreResult<Vec<UserSessionTotal>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT uid, COALESCE(SUM(minutes_completed), 0)::BIGINT
            FROM user_sessions
            WHERE recorded_at >= $1
            GROUP BY uid
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(uid, weekly_minutes)| UserSessionTotal {
                uid,
                weekly_minutes,
            })
            .collect())
    }

    async fn merge_user_stats(&self, stats: &[UserStatsRecord]) -> StoreResult<()> {
        for record in stats {
            sqlx::query(
                r#"
                INSERT INTO user_stats (uid, percentile, weekly_minutes, rank, total_users, last_updated)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (uid) DO UPDATE SET
                    percentile = EXCLUDED.percentile,
                    weekly_minutes = EXCLUDED.weekly_minutes,
                    rank = EXCLUDED.rank,
                    total_users = EXCLUDED.total_users,
                    last_updated = EXCLUDED.last_updated
                "#,
            )
            .bind(&record.uid)
            .bind(record.percentile)
            .bind(record.weekly_minutes)
            .bind(record.rank)
            .bind(record.total_users)
            .bind(record.last_updated)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}
