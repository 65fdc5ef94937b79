//! `stale_job_reap` handler: recover jobs abandoned by a dead worker.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use tracing::{debug, warn};

use pushhub_entity::job::{Job, job_types};

use crate::executor::{JobExecutionError, JobHandler};
use crate::queue::JobQueue;

/// Requeues jobs held in `running` past the worker lease, or fails them
/// once their attempts are spent.
#[derive(Debug)]
pub struct StaleJobReaper {
    queue: Arc<JobQueue>,
    lease: Duration,
}

impl StaleJobReaper {
    /// Create a reaper for jobs running longer than `lease`.
    pub fn new(queue: Arc<JobQueue>, lease: Duration) -> Self {
        Self { queue, lease }
    }
}

#[async_trait]
impl JobHandler for StaleJobReaper {
    fn job_type(&self) -> &str {
        job_types::STALE_JOB_REAP
    }

    async fn execute(&self, _job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let reaped = self
            .queue
            .reap_stale(self.lease)
            .await
            .map_err(|e| JobExecutionError::Transient(format!("Stale job reap failed: {e}")))?;

        if reaped.requeued > 0 || reaped.failed > 0 {
            warn!(
                requeued = reaped.requeued,
                failed = reaped.failed,
                lease_seconds = self.lease.num_seconds(),
                "Recovered jobs past their lease"
            );
        } else {
            debug!("No stale jobs");
        }
        Ok(Some(serde_json::json!({
            "task": job_types::STALE_JOB_REAP,
            "requeued": reaped.requeued,
            "failed": reaped.failed,
        })))
    }
}
