//! Delivery log status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current outcome of one (notification, device) delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Accepted by the push provider.
    Sent,
    /// Confirmed on the device.
    Delivered,
    /// Rejected or not attempted successfully.
    Failed,
    /// Opened by the user. Never overwritten.
    Clicked,
}

impl DeliveryStatus {
    /// Whether the status counts toward `total_sent` / `total_delivered`.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sent | Self::Delivered | Self::Clicked)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Clicked => "clicked",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
