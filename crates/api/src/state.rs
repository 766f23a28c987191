//! Application state.
//!
//! All service handles are constructed once at startup and cloned per
//! request; nothing here is mutated after construction.

use std::sync::Arc;

use reqwest::Client;

use pomo_billing::BillingService;
use pomo_shared::RecordStore;

use crate::auth::JwtManager;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub billing: Arc<BillingService>,
    pub jwt_manager: JwtManager,
    pub http_client: Client,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, billing: Arc<BillingService>, config: Config) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret);

        Self {
            store,
            billing,
            jwt_manager,
            http_client: Client::new(),
            config,
        }
    }
}
