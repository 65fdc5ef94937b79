//! Typed job payloads.

use pushhub_core::types::{AppId, DeviceId, NotificationId};
use serde::{Deserialize, Serialize};

use crate::device::{Device, Platform};
use crate::notification::{Notification, NotificationPayload};

/// Job type identifiers stored in `jobs.job_type`.
pub mod job_types {
    /// Deliver one notification to one device.
    pub const PUSH_DELIVERY: &str = "push_delivery";
    /// Fan a notification out into delivery jobs.
    pub const NOTIFICATION_DISPATCH: &str = "notification_dispatch";
    /// Claim scheduled notifications that have come due.
    pub const SCHEDULED_SWEEP: &str = "scheduled_sweep";
    /// Purge finished jobs.
    pub const JOB_CLEANUP: &str = "job_cleanup";
    /// Requeue running jobs held past the worker lease.
    pub const STALE_JOB_REAP: &str = "stale_job_reap";
}

/// Queue message for a single (notification, device) delivery.
///
/// Retries are new jobs carrying an incremented `attempt_count`; the
/// queue's own attempt counter is never consulted for backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    /// Notification being delivered.
    pub notification_id: NotificationId,
    /// Target device.
    pub device_id: DeviceId,
    /// Owning app, used to resolve provider credentials.
    pub app_id: AppId,
    /// Delivery platform.
    pub platform: Platform,
    /// APNs/FCM token or WebPush endpoint.
    pub token: String,
    /// WebPush subscriber public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_push_p256dh: Option<String>,
    /// WebPush subscriber auth secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_push_auth: Option<String>,
    /// Content to deliver.
    pub payload: NotificationPayload,
    /// Attempts already made for this pair.
    #[serde(default)]
    pub attempt_count: u32,
    /// Error from the previous attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl DeliveryJob {
    /// First-attempt job for `device`.
    pub fn for_device(notification: &Notification, device: &Device) -> Self {
        Self {
            notification_id: notification.id,
            device_id: device.id,
            app_id: device.app_id,
            platform: device.platform,
            token: device.token.clone(),
            web_push_p256dh: device.p256dh.clone(),
            web_push_auth: device.auth_secret.clone(),
            payload: notification.payload.0.clone(),
            attempt_count: 0,
            last_error: None,
        }
    }

    /// Queue idempotency key for this attempt of the pair.
    pub fn dedupe_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            job_types::PUSH_DELIVERY,
            self.notification_id,
            self.device_id,
            self.attempt_count
        )
    }

    /// Follow-up job after a failed attempt.
    pub fn next_attempt(&self, error: impl Into<String>) -> Self {
        Self {
            attempt_count: self.attempt_count + 1,
            last_error: Some(error.into()),
            ..self.clone()
        }
    }
}

/// Payload of a `notification_dispatch` job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    /// Notification to fan out.
    pub notification_id: NotificationId,
}
