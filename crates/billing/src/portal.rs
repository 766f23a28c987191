//! Billing portal session creation.

use std::sync::Arc;

use pomo_shared::RecordStore;

use crate::error::{BillingError, BillingResult};
use crate::gateway::BillingGateway;

pub struct PortalService {
    gateway: Arc<dyn BillingGateway>,
    store: Arc<dyn RecordStore>,
    return_url: String,
}

impl PortalService {
    pub fn new(
        gateway: Arc<dyn BillingGateway>,
        store: Arc<dyn RecordStore>,
        return_url: String,
    ) -> Self {
        Self {
            gateway,
            store,
            return_url,
        }
    }

    /// Create a portal session for a user with a stored billing customer.
    pub async fn create_session(&self, uid: &str) -> BillingResult<String> {
        let record = self.store.subscription(uid).await?.ok_or_else(|| {
            BillingError::FailedPrecondition("no active subscription found".to_string())
        })?;

        let customer_id = record.customer_id.ok_or_else(|| {
            BillingError::FailedPrecondition("no active subscription found".to_string())
        })?;

        let url = self
            .gateway
            .create_portal_session(&customer_id, &self.return_url)
            .await?;

        tracing::info!(uid = %uid, "Created billing portal session");
        Ok(url)
    }
}
