//! Queue job lifecycle and priority.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a queue job is in its lifecycle.
///
/// Delivery retries never return a job to `Pending` through the queue: each
/// retry is a fresh job, so a `Failed` delivery job is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Runnable once `scheduled_at` has passed.
    Pending,
    /// Claimed by a worker.
    Running,
    Completed,
    Failed,
    /// Withdrawn by an operator before a worker claimed it.
    Cancelled,
}

impl JobStatus {
    /// No worker will touch the job again; eligible for cleanup.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// An operator may enqueue a copy of the job.
    pub fn can_resubmit(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim order within a queue; ties go to the earliest `scheduled_at`.
///
/// Dispatch fan-out jobs run `High` so targets are resolved before the
/// deliveries of older notifications drain, deliveries run `Normal`, and
/// housekeeping tasks run `Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "job_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl JobPriority {
    /// Rank used for ordering; higher is claimed first.
    pub fn numeric_priority(&self) -> i16 {
        *self as i16 + 1
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
