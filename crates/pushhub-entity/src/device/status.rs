//! Device lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "device_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Registered, no successful delivery yet.
    Pending,
    /// At least one delivery succeeded.
    Active,
    /// Disabled after a credential rejection; needs re-registration.
    Inactive,
    /// The push service reported the endpoint gone.
    Expired,
}

impl DeviceStatus {
    /// Whether deliveries may be attempted.
    pub fn is_deliverable(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
