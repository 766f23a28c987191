//! Pomo Background Worker
//!
//! Handles scheduled jobs:
//! - Weekly user stats aggregation and percentile ranking (daily at 3:00 AM UTC)

mod stats;

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use pomo_shared::{PgStore, RecordStore};

use crate::stats::StatsAggregator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Pomo Worker");

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = pomo_shared::create_pool(&database_url).await?;
    info!("Database pool created");

    let store: Arc<dyn RecordStore> = Arc::new(PgStore::new(pool));

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Aggregate weekly user stats (daily at 3:00 AM UTC)
    let stats_store = store.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let aggregator = StatsAggregator::new(stats_store.clone());
            Box::pin(async move {
                info!("Starting user stats aggregation");
                match aggregator.run().await {
                    Ok(count) => {
                        info!(users = count, "User stats aggregation complete");
                    }
                    Err(e) => {
                        error!(error = %e, "User stats aggregation failed");
                    }
                }
            })
        })?)
        .await?;
    info!("Scheduled: User stats aggregation (daily at 3:00 AM UTC)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Pomo Worker started successfully");

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
