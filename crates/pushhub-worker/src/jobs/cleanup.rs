//! `job_cleanup` handler: purge finished jobs past retention.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::info;

use pushhub_entity::job::{Job, job_types};

use crate::executor::{JobExecutionError, JobHandler};
use crate::queue::JobQueue;

/// Deletes completed, failed, and cancelled jobs older than the retention window.
#[derive(Debug)]
pub struct JobCleanupHandler {
    queue: Arc<JobQueue>,
    retention_days: i64,
}

impl JobCleanupHandler {
    /// Create a cleanup handler.
    pub fn new(queue: Arc<JobQueue>, retention_days: i64) -> Self {
        Self {
            queue,
            retention_days,
        }
    }
}

#[async_trait]
impl JobHandler for JobCleanupHandler {
    fn job_type(&self) -> &str {
        job_types::JOB_CLEANUP
    }

    async fn execute(&self, _job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let cutoff = Utc::now() - Duration::days(self.retention_days.max(0));
        let removed = self
            .queue
            .cleanup(cutoff)
            .await
            .map_err(|e| JobExecutionError::Transient(format!("Job cleanup failed: {e}")))?;

        info!(removed, retention_days = self.retention_days, "Cleaned up finished jobs");
        Ok(Some(serde_json::json!({
            "task": job_types::JOB_CLEANUP,
            "removed": removed,
            "cutoff": cutoff,
        })))
    }
}
