//! Pomo API Server
//!
//! Serves the Stripe webhook endpoint and the authenticated billing and
//! integration operations.

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pomo_api::{create_router, AppState, Config};
use pomo_billing::BillingService;
use pomo_shared::{PgStore, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pomo_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Pomo API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = pomo_shared::create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    pomo_shared::run_migrations(&pool).await?;

    let store: Arc<dyn RecordStore> = Arc::new(PgStore::new(pool));
    let billing = Arc::new(BillingService::from_env(store.clone())?);
    tracing::info!("Stripe billing service initialized");

    let state = AppState::new(store, billing, config.clone());

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
