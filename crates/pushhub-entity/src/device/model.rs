//! Device entity model.

use chrono::{DateTime, Utc};
use pushhub_core::types::{AppId, DeviceId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::platform::Platform;
use super::status::DeviceStatus;

/// A registered push endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Device {
    /// Unique device identifier.
    pub id: DeviceId,
    /// Owning app.
    pub app_id: AppId,
    /// Delivery platform.
    pub platform: Platform,
    /// APNs/FCM token, or the WebPush endpoint URL.
    pub token: String,
    /// WebPush subscriber public key (base64url).
    pub p256dh: Option<String>,
    /// WebPush subscriber auth secret (base64url).
    pub auth_secret: Option<String>,
    /// Current lifecycle status.
    pub status: DeviceStatus,
    /// VAPID public key in effect when the device subscribed.
    pub credential_fingerprint: Option<String>,
    /// Error that caused the last deactivation.
    pub last_error: Option<String>,
    /// When the device was registered.
    pub created_at: DateTime<Utc>,
    /// When the device was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Whether deliveries to this device may be attempted.
    pub fn is_deliverable(&self) -> bool {
        self.status.is_deliverable()
    }
}

/// Data required to register (or re-register) a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDevice {
    /// Owning app.
    pub app_id: AppId,
    /// Delivery platform.
    pub platform: Platform,
    /// APNs/FCM token, or the WebPush endpoint URL.
    pub token: String,
    /// WebPush subscriber public key.
    pub p256dh: Option<String>,
    /// WebPush subscriber auth secret.
    pub auth_secret: Option<String>,
    /// VAPID public key the subscription was created with.
    pub credential_fingerprint: Option<String>,
}
