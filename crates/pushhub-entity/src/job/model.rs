//! Job entity model.

use chrono::{DateTime, Utc};
use pushhub_core::types::JobId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{JobPriority, JobStatus};

/// A durable queue job.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Job type identifier (see [`super::job_types`]).
    pub job_type: String,
    /// Queue name.
    pub queue: String,
    /// Job priority.
    pub priority: JobPriority,
    /// Job-specific payload (JSON).
    pub payload: serde_json::Value,
    /// Result data on completion (JSON).
    pub result: Option<serde_json::Value>,
    /// Error message on failure.
    pub error_message: Option<String>,
    /// Current job status.
    pub status: JobStatus,
    /// Number of times the queue handed this row to a worker.
    pub attempts: i32,
    /// Queue-level attempt ceiling.
    pub max_attempts: i32,
    /// Earliest execution time.
    pub scheduled_at: DateTime<Utc>,
    /// When the job started executing.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Worker ID that picked up the job.
    pub worker_id: Option<String>,
    /// Idempotency key; at most one job exists per key.
    pub dedupe_key: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Check if the queue may hand the job out again after an error.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Data required to create a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    /// Job type identifier.
    pub job_type: String,
    /// Queue name.
    pub queue: String,
    /// Priority.
    pub priority: JobPriority,
    /// Job-specific payload.
    pub payload: serde_json::Value,
    /// Queue-level attempt ceiling.
    pub max_attempts: i32,
    /// Earliest execution time; `None` runs as soon as possible.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When set, enqueueing a second job with the same key returns the
    /// existing job instead.
    pub dedupe_key: Option<String>,
}
