//! Per-device delivery: one job is one attempt.
//!
//! ```text
//! QUEUED -> IN_FLIGHT -> SUCCESS
//!                     -> RETRY_SCHEDULED (new job, attempt_count + 1)
//!                     -> ABANDONED
//! ```
//!
//! The notification and device are re-read at job start, so cancellations
//! and deactivations that happened while the job waited are honoured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use pushhub_core::config::VapidForbiddenPolicy;
use pushhub_database::store::{DeviceStore, NotificationStore, Stores};
use pushhub_entity::delivery::DeliveryOutcome;
use pushhub_entity::device::{Device, DeviceStatus, Platform};
use pushhub_entity::job::{DeliveryJob, Job, job_types};
use pushhub_provider::{ProviderError, PushMessage, SendResult, SenderResolver};

use crate::executor::{JobExecutionError, JobHandler};
use crate::ledger::DeliveryLedger;
use crate::queue::JobQueue;
use crate::retry::{FailureClass, RetryDecision, RetryPolicy};

/// Final state of one delivery job, stored as the job result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    /// The provider accepted the message.
    Success {
        attempt_count: u32,
        message_id: Option<String>,
        status_code: Option<u16>,
    },
    /// A follow-up job was enqueued.
    RetryScheduled {
        attempt_count: u32,
        next_attempt: u32,
        run_at: DateTime<Utc>,
        error: String,
    },
    /// No further attempts.
    Abandoned {
        attempt_count: u32,
        class: FailureClass,
        error: String,
        /// Status this job moved the device to, if any.
        device_status: Option<DeviceStatus>,
    },
    /// Nothing was sent or recorded.
    Skipped { reason: String },
}

/// Sends one message per job and records the outcome.
#[derive(Debug, Clone)]
pub struct DeliveryWorker {
    notifications: Arc<dyn NotificationStore>,
    devices: Arc<dyn DeviceStore>,
    ledger: DeliveryLedger,
    resolver: Arc<dyn SenderResolver>,
    queue: Arc<JobQueue>,
    policy: RetryPolicy,
    send_timeout: Duration,
}

impl DeliveryWorker {
    /// Create a delivery worker.
    pub fn new(
        stores: &Stores,
        resolver: Arc<dyn SenderResolver>,
        queue: Arc<JobQueue>,
        policy: RetryPolicy,
        send_timeout: Duration,
    ) -> Self {
        Self {
            notifications: stores.notifications.clone(),
            devices: stores.devices.clone(),
            ledger: DeliveryLedger::new(stores.deliveries.clone()),
            resolver,
            queue,
            policy,
            send_timeout,
        }
    }

    /// Run one delivery attempt.
    pub async fn process(&self, delivery: &DeliveryJob) -> Result<DeliveryState, JobExecutionError> {
        let Some(notification) = self.notifications.find_by_id(delivery.notification_id).await? else {
            return Ok(skipped("notification not found"));
        };
        if !notification.status.accepts_deliveries() {
            return Ok(skipped(format!("notification is {}", notification.status)));
        }

        let Some(device) = self.devices.find_by_id(delivery.device_id).await? else {
            return Ok(skipped("device not found"));
        };
        if !device.is_deliverable() {
            return Ok(skipped(format!("device is {}", device.status)));
        }

        match self.send(delivery).await {
            Ok(result) if result.success => self.on_success(delivery, &device, result).await,
            Ok(result) => {
                let error = result.error.unwrap_or_else(|| match result.status_code {
                    Some(code) => format!("HTTP {code}"),
                    None => "Provider rejected the message".to_string(),
                });
                self.on_failure(delivery, &device, result.status_code, error).await
            }
            Err(e) => match self.policy.classify_error(&e) {
                FailureClass::Transient => {
                    self.on_failure(delivery, &device, None, e.to_string()).await
                }
                FailureClass::Permanent => self.on_exception(delivery, e).await,
            },
        }
    }

    async fn send(&self, delivery: &DeliveryJob) -> Result<SendResult, ProviderError> {
        let sender = self.resolver.resolve(delivery.app_id, delivery.platform).await?;
        let message = PushMessage::from(delivery);
        match tokio::time::timeout(self.send_timeout, sender.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "send did not complete within {}s",
                self.send_timeout.as_secs_f64()
            ))),
        }
    }

    async fn on_success(
        &self,
        delivery: &DeliveryJob,
        device: &Device,
        result: SendResult,
    ) -> Result<DeliveryState, JobExecutionError> {
        let outcome = DeliveryOutcome::success(
            result.message_id.clone(),
            result.status_code,
            delivery.attempt_count,
        );
        self.ledger
            .record(delivery.notification_id, delivery.device_id, &outcome)
            .await?;

        if device.status == DeviceStatus::Pending {
            self.devices.mark_active(device.id).await?;
        }

        debug!(
            notification_id = %delivery.notification_id,
            device_id = %delivery.device_id,
            attempt = delivery.attempt_count,
            "Delivered"
        );
        Ok(DeliveryState::Success {
            attempt_count: delivery.attempt_count,
            message_id: result.message_id,
            status_code: result.status_code,
        })
    }

    async fn on_failure(
        &self,
        delivery: &DeliveryJob,
        device: &Device,
        status_code: Option<u16>,
        error: String,
    ) -> Result<DeliveryState, JobExecutionError> {
        let outcome = DeliveryOutcome::failure(&error, status_code, delivery.attempt_count);
        self.ledger
            .record(delivery.notification_id, delivery.device_id, &outcome)
            .await?;

        if delivery.platform == Platform::Web && self.policy.is_vapid_rejection(status_code, &error) {
            return self.on_vapid_rejection(delivery, device, error).await;
        }

        match self.policy.classify(status_code, &error) {
            FailureClass::Permanent => {
                let expired = self.devices.expire(device.id, &error).await?;
                info!(
                    notification_id = %delivery.notification_id,
                    device_id = %delivery.device_id,
                    status_code = ?status_code,
                    expired,
                    error = %error,
                    "Permanent delivery failure"
                );
                Ok(abandoned(
                    delivery,
                    FailureClass::Permanent,
                    error,
                    expired.then_some(DeviceStatus::Expired),
                ))
            }
            FailureClass::Transient => self.schedule_retry(delivery, error).await,
        }
    }

    /// A push service refused our VAPID credentials for this subscription.
    async fn on_vapid_rejection(
        &self,
        delivery: &DeliveryJob,
        device: &Device,
        error: String,
    ) -> Result<DeliveryState, JobExecutionError> {
        let current_key = match self.resolver.webpush_public_key(delivery.app_id).await {
            Ok(key) => key,
            Err(e) => {
                warn!(app_id = %delivery.app_id, error = %e, "Could not read current VAPID key");
                None
            }
        };
        let stale = matches!(
            (&device.credential_fingerprint, &current_key),
            (Some(fingerprint), Some(key)) if fingerprint != key
        );

        if stale {
            info!(device_id = %device.id, "Subscription was created under a previous VAPID key");
            return self.deactivate(delivery, device, error).await;
        }

        match self.policy.vapid_policy() {
            VapidForbiddenPolicy::Deactivate => self.deactivate(delivery, device, error).await,
            VapidForbiddenPolicy::Manual => {
                warn!(
                    device_id = %device.id,
                    error = %error,
                    "VAPID rejection left for manual resolution"
                );
                Ok(abandoned(delivery, FailureClass::Permanent, error, None))
            }
            VapidForbiddenPolicy::Retry if self.policy.vapid_retry_allowed(delivery.attempt_count) => {
                self.schedule_retry(delivery, error).await
            }
            VapidForbiddenPolicy::Retry => self.deactivate(delivery, device, error).await,
        }
    }

    async fn deactivate(
        &self,
        delivery: &DeliveryJob,
        device: &Device,
        error: String,
    ) -> Result<DeliveryState, JobExecutionError> {
        let changed = self.devices.deactivate(device.id, &error).await?;
        Ok(abandoned(
            delivery,
            FailureClass::Permanent,
            error,
            changed.then_some(DeviceStatus::Inactive),
        ))
    }

    async fn schedule_retry(
        &self,
        delivery: &DeliveryJob,
        error: String,
    ) -> Result<DeliveryState, JobExecutionError> {
        match self.policy.decide(delivery.attempt_count) {
            RetryDecision::Retry { next_attempt, delay } => {
                let now = Utc::now();
                let run_at = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                self.queue
                    .enqueue_delivery(&delivery.next_attempt(&error), Some(run_at))
                    .await?;
                warn!(
                    notification_id = %delivery.notification_id,
                    device_id = %delivery.device_id,
                    attempt = delivery.attempt_count,
                    next_attempt,
                    delay_seconds = delay.as_secs(),
                    error = %error,
                    "Delivery failed, retry scheduled"
                );
                Ok(DeliveryState::RetryScheduled {
                    attempt_count: delivery.attempt_count,
                    next_attempt,
                    run_at,
                    error,
                })
            }
            RetryDecision::Abandon => {
                warn!(
                    notification_id = %delivery.notification_id,
                    device_id = %delivery.device_id,
                    attempt = delivery.attempt_count,
                    error = %error,
                    "Retry budget exhausted, abandoning delivery"
                );
                Ok(abandoned(delivery, FailureClass::Transient, error, None))
            }
        }
    }

    /// Errors that are neither a provider answer nor a transport failure.
    async fn on_exception(
        &self,
        delivery: &DeliveryJob,
        e: ProviderError,
    ) -> Result<DeliveryState, JobExecutionError> {
        let text = e.to_string();
        error!(
            notification_id = %delivery.notification_id,
            device_id = %delivery.device_id,
            attempt = delivery.attempt_count,
            error = %text,
            "Delivery raised an error"
        );

        let outcome = DeliveryOutcome::failure(&text, None, delivery.attempt_count);
        if let Err(write_err) = self
            .ledger
            .record_failure_once(delivery.notification_id, delivery.device_id, &outcome)
            .await
        {
            error!(error = %write_err, "Failed to record delivery error");
        }

        Err(JobExecutionError::Permanent(text))
    }
}

fn skipped(reason: impl Into<String>) -> DeliveryState {
    let reason = reason.into();
    debug!(reason = %reason, "Skipping delivery");
    DeliveryState::Skipped { reason }
}

fn abandoned(
    delivery: &DeliveryJob,
    class: FailureClass,
    error: String,
    device_status: Option<DeviceStatus>,
) -> DeliveryState {
    DeliveryState::Abandoned {
        attempt_count: delivery.attempt_count,
        class,
        error,
        device_status,
    }
}

#[async_trait]
impl JobHandler for DeliveryWorker {
    fn job_type(&self) -> &str {
        job_types::PUSH_DELIVERY
    }

    async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let delivery: DeliveryJob = serde_json::from_value(job.payload.clone())
            .map_err(|e| JobExecutionError::Permanent(format!("Invalid delivery payload: {e}")))?;
        let state = self.process(&delivery).await?;
        let result = serde_json::to_value(&state)
            .map_err(|e| JobExecutionError::Permanent(format!("Failed to encode result: {e}")))?;
        Ok(Some(result))
    }
}
