//! Delivery ledger: the only writer of notification counters.
//!
//! Every call maps to one atomic store operation. The store reads the
//! previous status of the (notification, device) pair and applies the
//! counter transition in the same step, so a retry that succeeds after a
//! failure moves the pair from `failed` to `sent` instead of counting it
//! twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use pushhub_core::result::AppResult;
use pushhub_core::types::{DeviceId, NotificationId};
use pushhub_database::store::{DeliveryLogStore, Reconciliation};
use pushhub_entity::delivery::{DeliveryLog, DeliveryOutcome, LedgerEntry};

/// Records delivery outcomes and keeps notification aggregates consistent.
#[derive(Debug, Clone)]
pub struct DeliveryLedger {
    store: Arc<dyn DeliveryLogStore>,
}

impl DeliveryLedger {
    /// Create a ledger over a delivery log store.
    pub fn new(store: Arc<dyn DeliveryLogStore>) -> Self {
        Self { store }
    }

    /// Record the outcome of an attempt.
    pub async fn record(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        outcome: &DeliveryOutcome,
    ) -> AppResult<LedgerEntry> {
        let entry = self.store.record(notification_id, device_id, outcome).await?;
        debug!(
            notification_id = %notification_id,
            device_id = %device_id,
            attempt = outcome.attempt_count,
            previous = ?entry.previous,
            current = %entry.current,
            "Recorded delivery outcome"
        );
        Ok(entry)
    }

    /// Record a failure unless the pair is already failed.
    pub async fn record_failure_once(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        outcome: &DeliveryOutcome,
    ) -> AppResult<Option<LedgerEntry>> {
        self.store
            .record_failure_once(notification_id, device_id, outcome)
            .await
    }

    /// Overlay a click on a successful delivery. Returns whether it counted.
    pub async fn record_click(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.store.record_click(notification_id, device_id, at).await
    }

    /// Current ledger row for a pair.
    pub async fn find(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
    ) -> AppResult<Option<DeliveryLog>> {
        self.store.find(notification_id, device_id).await
    }

    /// All ledger rows of a notification.
    pub async fn entries(&self, notification_id: NotificationId) -> AppResult<Vec<DeliveryLog>> {
        self.store.list_for_notification(notification_id).await
    }

    /// Recompute the notification's counters from its ledger rows.
    pub async fn reconcile(&self, notification_id: NotificationId) -> AppResult<Reconciliation> {
        let result = self.store.reconcile(notification_id).await?;
        if result.drifted() {
            info!(
                notification_id = %notification_id,
                before = ?result.before,
                after = ?result.after,
                "Repaired drifted delivery counters"
            );
        }
        Ok(result)
    }
}
