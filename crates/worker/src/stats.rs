//! Weekly user stats aggregation.
//!
//! Ranks users by completed-session minutes over the trailing week and
//! writes percentile standings. Ranking itself is pure; the aggregator wraps
//! it with store reads and chunked writes.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use pomo_shared::{RecordStore, StoreResult, UserSessionTotal, UserStatsRecord};

/// Trailing window the leaderboard covers.
pub const AGGREGATION_WINDOW_DAYS: i64 = 7;

/// Stats are written in chunks to bound batch size.
pub const STATS_WRITE_CHUNK: usize = 450;

/// Rank users by weekly minutes, descending. Percentile 0 is the top of the
/// leaderboard; ties break by uid so reruns are deterministic.
pub fn rank_users(
    mut totals: Vec<UserSessionTotal>,
    now: OffsetDateTime,
) -> Vec<UserStatsRecord> {
    totals.sort_by(|a, b| {
        b.weekly_minutes
            .cmp(&a.weekly_minutes)
            .then_with(|| a.uid.cmp(&b.uid))
    });

    let total_users = totals.len() as i64;

    totals
        .into_iter()
        .enumerate()
        .map(|(index, total)| UserStatsRecord {
            uid: total.uid,
            weekly_minutes: total.weekly_minutes,
            percentile: ((index as f64 / total_users as f64) * 100.0).round() as i32,
            rank: index as i64 + 1,
            total_users,
            last_updated: now,
        })
        .collect()
}

pub struct StatsAggregator {
    store: Arc<dyn RecordStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Aggregate the trailing week and write standings for every user with
    /// recorded sessions. Returns how many users were ranked.
    pub async fn run(&self) -> StoreResult<usize> {
        let now = OffsetDateTime::now_utc();
        let since = now - Duration::days(AGGREGATION_WINDOW_DAYS);

        let totals = self.store.weekly_session_totals(since).await?;
        let ranked = rank_users(totals, now);
        let count = ranked.len();

        for chunk in ranked.chunks(STATS_WRITE_CHUNK) {
            self.store.merge_user_stats(chunk).await?;
            tracing::info!(batch = chunk.len(), "Committed stats batch");
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomo_shared::MemoryStore;
    use time::macros::datetime;

    fn totals(entries: &[(&str, i64)]) -> Vec<UserSessionTotal> {
        entries
            .iter()
            .map(|(uid, weekly_minutes)| UserSessionTotal {
                uid: uid.to_string(),
                weekly_minutes: *weekly_minutes,
            })
            .collect()
    }

    fn now() -> OffsetDateTime {
        datetime!(2026-08-01 03:00 UTC)
    }

    #[test]
    fn ranks_descending_with_percentiles() {
        let ranked = rank_users(totals(&[("low", 10), ("top", 100), ("mid", 50)]), now());

        assert_eq!(ranked[0].uid, "top");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].percentile, 0);
        assert_eq!(ranked[1].uid, "mid");
        assert_eq!(ranked[1].percentile, 33);
        assert_eq!(ranked[2].uid, "low");
        assert_eq!(ranked[2].percentile, 67);
        assert!(ranked.iter().all(|r| r.total_users == 3));
    }

    #[test]
    fn ties_break_by_uid_for_deterministic_reruns() {
        let first = rank_users(totals(&[("b", 50), ("a", 50)]), now());
        let second = rank_users(totals(&[("a", 50), ("b", 50)]), now());
        assert_eq!(first, second);
        assert_eq!(first[0].uid, "a");
    }

    #[test]
    fn empty_input_produces_no_standings() {
        assert!(rank_users(Vec::new(), now()).is_empty());
    }

    #[tokio::test]
    async fn aggregator_ranks_only_the_trailing_week() {
        let store = Arc::new(MemoryStore::new());
        let recent = OffsetDateTime::now_utc() - Duration::days(1);
        let stale = OffsetDateTime::now_utc() - Duration::days(30);

        store.record_session("u1", 100, recent).await;
        store.record_session("u2", 25, recent).await;
        store.record_session("u2", 500, stale).await;

        let aggregator = StatsAggregator::new(store.clone());
        let count = aggregator.run().await.unwrap();
        assert_eq!(count, 2);

        let u1 = store.user_stats("u1").await.unwrap();
        let u2 = store.user_stats("u2").await.unwrap();
        assert_eq!(u1.rank, 1);
        assert_eq!(u2.rank, 2);
        assert_eq!(u2.weekly_minutes, 25);
    }
}
