//! Sender input and output.

use serde::{Deserialize, Serialize};

use pushhub_core::types::{DeviceId, NotificationId};
use pushhub_entity::job::DeliveryJob;
use pushhub_entity::notification::NotificationPayload;

/// One message addressed to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    /// Notification being delivered.
    pub notification_id: NotificationId,
    /// Target device.
    pub device_id: DeviceId,
    /// APNs/FCM device token or WebPush endpoint URL.
    pub token: String,
    /// WebPush subscriber public key (base64url).
    pub p256dh: Option<String>,
    /// WebPush subscriber auth secret (base64url).
    pub auth: Option<String>,
    /// Content.
    pub payload: NotificationPayload,
}

impl From<&DeliveryJob> for PushMessage {
    fn from(job: &DeliveryJob) -> Self {
        Self {
            notification_id: job.notification_id,
            device_id: job.device_id,
            token: job.token.clone(),
            p256dh: job.web_push_p256dh.clone(),
            auth: job.web_push_auth.clone(),
            payload: job.payload.clone(),
        }
    }
}

/// Provider answer for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    /// Whether the provider accepted the message.
    pub success: bool,
    /// Provider-assigned message identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Error text returned by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// HTTP status of the provider response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl SendResult {
    /// Accepted by the provider.
    pub fn success(message_id: Option<String>, status_code: u16) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
            status_code: Some(status_code),
        }
    }

    /// Rejected by the provider.
    pub fn failure(error: impl Into<String>, status_code: u16) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
            status_code: Some(status_code),
        }
    }
}
