//! Notification entity model.

use chrono::{DateTime, Duration, Utc};
use pushhub_core::types::{AppId, NotificationId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use super::counters::DeliveryCounters;
use super::payload::NotificationPayload;
use super::status::NotificationStatus;

/// One logical broadcast to every deliverable device of an app.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    /// Unique notification identifier.
    pub id: NotificationId,
    /// Owning app.
    pub app_id: AppId,
    /// Content sent to each device.
    pub payload: Json<NotificationPayload>,
    /// Dispatch status.
    pub status: NotificationStatus,
    /// Earliest dispatch time for scheduled notifications.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When the current dispatch claim was taken.
    pub dispatch_started_at: Option<DateTime<Utc>>,
    /// Token of the dispatcher holding the claim.
    pub dispatch_claim: Option<String>,
    /// When fan-out finished.
    pub sent_at: Option<DateTime<Utc>>,
    /// Why dispatch failed.
    pub failure_reason: Option<String>,
    /// Devices resolved at dispatch time.
    pub total_targets: i32,
    /// Deliveries accepted by a provider.
    pub total_sent: i32,
    /// Deliveries considered delivered.
    pub total_delivered: i32,
    /// Deliveries currently failed.
    pub total_failed: i32,
    /// Deliveries clicked.
    pub total_clicked: i32,
    /// When the notification was created.
    pub created_at: DateTime<Utc>,
    /// When the notification was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Current aggregate counters.
    pub fn counters(&self) -> DeliveryCounters {
        DeliveryCounters {
            total_sent: self.total_sent,
            total_delivered: self.total_delivered,
            total_failed: self.total_failed,
            total_clicked: self.total_clicked,
        }
    }

    /// Overwrite the aggregate counters.
    pub fn set_counters(&mut self, counters: DeliveryCounters) {
        self.total_sent = counters.total_sent;
        self.total_delivered = counters.total_delivered;
        self.total_failed = counters.total_failed;
        self.total_clicked = counters.total_clicked;
    }

    /// Whether a sweep at `now` should try to dispatch this notification:
    /// it is due and either unclaimed or held by a claim older than
    /// `stale_before`.
    pub fn is_due(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> bool {
        self.status.is_dispatchable()
            && self.scheduled_at.is_none_or(|at| at <= now)
            && self.dispatch_started_at.is_none_or(|at| at < stale_before)
    }

    /// Whether `claim` may take or re-take this notification.
    pub fn is_claimable(&self, claim: &DispatchClaim) -> bool {
        self.is_due(claim.at, claim.stale_before)
            || (self.status.is_dispatchable()
                && self.scheduled_at.is_none_or(|at| at <= claim.at)
                && self.dispatch_claim.as_deref() == Some(claim.token.as_str()))
    }
}

/// A dispatcher's hold on a notification while it fans out.
///
/// The holder may take the claim again (a retried dispatch job resumes its
/// own fan-out), and anyone may take it once it is older than the lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchClaim {
    /// Identifies the holder, such as the dispatch job ID.
    pub token: String,
    /// When the claim is taken.
    pub at: DateTime<Utc>,
    /// Claims started before this instant are abandoned.
    pub stale_before: DateTime<Utc>,
}

impl DispatchClaim {
    /// Claim taken now by `token`, abandoned after `lease`.
    pub fn new(token: impl Into<String>, lease: Duration) -> Self {
        let at = Utc::now();
        Self {
            token: token.into(),
            at,
            stale_before: at - lease,
        }
    }
}

/// Data required to create a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    /// Owning app.
    pub app_id: AppId,
    /// Content.
    pub payload: NotificationPayload,
    /// Dispatch time; `None` dispatches immediately.
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl CreateNotification {
    /// Initial status implied by the schedule.
    pub fn initial_status(&self) -> NotificationStatus {
        if self.scheduled_at.is_some() {
            NotificationStatus::Scheduled
        } else {
            NotificationStatus::Pending
        }
    }
}
