//! Notification fan-out: one delivery job per deliverable device.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pushhub_core::result::AppResult;
use pushhub_core::types::NotificationId;
use pushhub_database::store::{DeviceStore, NotificationStore, Stores};
use pushhub_entity::job::DeliveryJob;
use pushhub_entity::notification::{DispatchClaim, Notification};

use crate::jobs::delivery::DeliveryWorker;
use crate::queue::JobQueue;

/// How a dispatch call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Fan-out attempted for every resolved device; notification is `sent`.
    Dispatched,
    /// No deliverable devices; notification is `failed`.
    NoTargets,
    /// Missing, cancelled, not yet due, or claimed elsewhere.
    Skipped,
}

/// Result of dispatching one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub notification_id: NotificationId,
    pub outcome: DispatchOutcome,
    /// Devices resolved at dispatch time.
    pub total_targets: usize,
    /// Delivery jobs placed on the queue.
    pub enqueued: usize,
    /// Deliveries run inline because the queue was unavailable.
    pub delivered_inline: usize,
}

impl DispatchSummary {
    fn skipped(notification_id: NotificationId) -> Self {
        Self {
            notification_id,
            outcome: DispatchOutcome::Skipped,
            total_targets: 0,
            enqueued: 0,
            delivered_inline: 0,
        }
    }
}

/// Dispatch claims older than this are abandoned unless configured otherwise.
pub const DEFAULT_CLAIM_LEASE_SECONDS: i64 = 300;

/// Resolves targets and produces delivery jobs.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    notifications: Arc<dyn NotificationStore>,
    devices: Arc<dyn DeviceStore>,
    queue: Arc<JobQueue>,
    inline: Arc<DeliveryWorker>,
    lease: Duration,
}

impl NotificationDispatcher {
    /// Create a dispatcher. `inline` runs deliveries when the queue rejects them.
    pub fn new(stores: &Stores, queue: Arc<JobQueue>, inline: Arc<DeliveryWorker>) -> Self {
        Self {
            notifications: stores.notifications.clone(),
            devices: stores.devices.clone(),
            queue,
            inline,
            lease: Duration::seconds(DEFAULT_CLAIM_LEASE_SECONDS),
        }
    }

    /// Override how long a dispatch claim may be held before another
    /// dispatcher may take it over.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Queue a notification for dispatch, dispatching in-process if the
    /// queue is unavailable.
    pub async fn submit(&self, notification_id: NotificationId) -> AppResult<Option<DispatchSummary>> {
        match self.queue.enqueue_dispatch(notification_id).await {
            Ok(job) => {
                debug!(notification_id = %notification_id, job_id = %job.id, "Dispatch queued");
                Ok(None)
            }
            Err(e) => {
                warn!(
                    notification_id = %notification_id,
                    error = %e,
                    "Job queue unavailable, dispatching synchronously"
                );
                self.dispatch(notification_id).await.map(Some)
            }
        }
    }

    /// Claim a due notification under a fresh token and fan it out.
    pub async fn dispatch(&self, notification_id: NotificationId) -> AppResult<DispatchSummary> {
        self.dispatch_as(notification_id, &Uuid::now_v7().to_string()).await
    }

    /// Claim a due notification as `token` and fan it out.
    ///
    /// A caller that retries with the same token (a dispatch job re-run
    /// after an error or a lost worker) resumes its own claim. Delivery jobs
    /// are idempotent per (notification, device, attempt), so a resumed
    /// fan-out does not queue a device twice. If the fan-out fails the claim
    /// is released so the notification is due again.
    pub async fn dispatch_as(
        &self,
        notification_id: NotificationId,
        token: &str,
    ) -> AppResult<DispatchSummary> {
        let claim = DispatchClaim::new(token, self.lease);
        let Some(notification) = self
            .notifications
            .claim_for_dispatch(notification_id, &claim)
            .await?
        else {
            debug!(notification_id = %notification_id, "Notification not claimable");
            return Ok(DispatchSummary::skipped(notification_id));
        };

        match self.fan_out(&notification).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!(
                    notification_id = %notification_id,
                    error = %e,
                    "Dispatch failed, releasing claim"
                );
                if let Err(release) =
                    self.notifications.release_claim(notification_id, token).await
                {
                    error!(
                        notification_id = %notification_id,
                        error = %release,
                        "Failed to release dispatch claim"
                    );
                }
                Err(e)
            }
        }
    }

    async fn fan_out(&self, notification: &Notification) -> AppResult<DispatchSummary> {
        let notification_id = notification.id;
        let devices = self.devices.find_deliverable(notification.app_id).await?;
        let total_targets = devices.len();
        self.notifications
            .set_total_targets(notification_id, i32::try_from(total_targets).unwrap_or(i32::MAX))
            .await?;

        if devices.is_empty() {
            self.notifications
                .mark_failed(notification_id, "No deliverable devices")
                .await?;
            warn!(notification_id = %notification_id, "Notification has no deliverable devices");
            return Ok(DispatchSummary {
                notification_id,
                outcome: DispatchOutcome::NoTargets,
                total_targets: 0,
                enqueued: 0,
                delivered_inline: 0,
            });
        }

        let mut enqueued = 0;
        let mut delivered_inline = 0;
        let mut queue_down = false;
        for device in &devices {
            let job = DeliveryJob::for_device(notification, device);
            if !queue_down {
                match self.queue.enqueue_delivery(&job, None).await {
                    Ok(_) => {
                        enqueued += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            notification_id = %notification_id,
                            error = %e,
                            "Job queue unavailable, delivering synchronously"
                        );
                        queue_down = true;
                    }
                }
            }

            if let Err(e) = self.inline.process(&job).await {
                error!(
                    notification_id = %notification_id,
                    device_id = %device.id,
                    error = %e,
                    "Inline delivery failed"
                );
            }
            delivered_inline += 1;
        }

        self.notifications.mark_sent(notification_id).await?;
        info!(
            notification_id = %notification_id,
            total_targets,
            enqueued,
            delivered_inline,
            "Notification dispatched"
        );

        Ok(DispatchSummary {
            notification_id,
            outcome: DispatchOutcome::Dispatched,
            total_targets,
            enqueued,
            delivered_inline,
        })
    }

    /// Dispatch every notification due at `now`, including ones whose
    /// claim has outlived the lease. A notification that fails to dispatch
    /// is logged and left for the next sweep.
    pub async fn sweep(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<DispatchSummary>> {
        let due = self
            .notifications
            .find_due(now, now - self.lease, limit)
            .await?;
        let mut summaries = Vec::with_capacity(due.len());
        for notification in due {
            match self.dispatch(notification.id).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!(
                    notification_id = %notification.id,
                    error = %e,
                    "Scheduled dispatch failed"
                ),
            }
        }
        Ok(summaries)
    }

    /// Cancel a notification that has not been claimed yet.
    pub async fn cancel(&self, notification_id: NotificationId) -> AppResult<bool> {
        let cancelled = self.notifications.cancel(notification_id).await?;
        if cancelled {
            info!(notification_id = %notification_id, "Notification cancelled");
        }
        Ok(cancelled)
    }
}
