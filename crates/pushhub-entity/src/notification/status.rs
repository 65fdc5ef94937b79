//! Notification status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dispatch status of a notification.
///
/// `Sent` means dispatch was attempted for every resolved target, not that
/// every delivery succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    /// Ready for immediate dispatch.
    Pending,
    /// Waiting for `scheduled_at`.
    Scheduled,
    /// Fan-out finished.
    Sent,
    /// No targets could be resolved.
    Failed,
    /// Withdrawn before dispatch.
    Cancelled,
}

impl NotificationStatus {
    /// Whether the dispatcher may still claim the notification.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled)
    }

    /// Whether queued delivery jobs for the notification should still run.
    pub fn accepts_deliveries(&self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled | Self::Sent)
    }

    /// Check if the notification is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed | Self::Cancelled)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
