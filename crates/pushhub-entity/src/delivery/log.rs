//! Delivery log entity model.

use chrono::{DateTime, Utc};
use pushhub_core::types::{DeliveryLogId, DeviceId, NotificationId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::DeliveryStatus;

/// Latest known outcome for a (notification, device) pair.
///
/// At most one row exists per pair; retries update it in place.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryLog {
    /// Row identifier.
    pub id: DeliveryLogId,
    /// Notification being delivered.
    pub notification_id: NotificationId,
    /// Target device.
    pub device_id: DeviceId,
    /// Current outcome.
    pub status: DeliveryStatus,
    /// Provider or worker error for failed outcomes.
    pub error_message: Option<String>,
    /// Provider response details (message id, status code).
    pub provider_response: Option<serde_json::Value>,
    /// Job attempt that produced the current outcome.
    pub attempt_count: i32,
    /// HTTP status returned by the provider.
    pub status_code: Option<i32>,
    /// When the provider accepted the message.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the user clicked the notification.
    pub clicked_at: Option<DateTime<Utc>>,
    /// First attempt.
    pub created_at: DateTime<Utc>,
    /// Latest attempt.
    pub updated_at: DateTime<Utc>,
}
