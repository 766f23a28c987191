// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pomo Shared
//!
//! Domain types and the record-store abstraction used by the API server and
//! the background worker: the per-user subscription document, the processed
//! event ledger rows, OAuth states, and weekly user stats.

pub mod postgres;
pub mod record;
pub mod store;

pub use postgres::PgStore;
pub use record::{
    OAuthState, ProcessedEvent, RecordPatch, SubscriptionRecord, SubscriptionStatus, Tier,
    UserSessionTotal, UserStatsRecord,
};
pub use store::{MemoryStore, RecordStore, StoreError, StoreResult};

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Create the shared database pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Run pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
