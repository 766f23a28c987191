//! Event ledger: at-most-once admission of inbound billing events.
//!
//! The gateway delivers at-least-once. Admission records a permanent
//! tombstone per event id; only the first admission wins. The Postgres store
//! makes the claim atomic. Duplicate processing that slips through a
//! non-atomic store would still converge, because reconciliation is
//! idempotent: it risks wasted work, not incorrect state.

use std::sync::Arc;

use pomo_shared::RecordStore;

use crate::error::BillingResult;
use crate::events::BillingEvent;

#[derive(Clone)]
pub struct EventLedger {
    store: Arc<dyn RecordStore>,
}

impl EventLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Returns `true` when this call claimed the event; `false` for replays.
    pub async fn admit(&self, event: &BillingEvent) -> BillingResult<bool> {
        let admitted = self.store.admit_event(&event.processed_marker()).await?;

        if !admitted {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Duplicate billing event, skipping"
            );
        }

        Ok(admitted)
    }
}
