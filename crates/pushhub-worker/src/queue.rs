//! Job queue facade over the durable job store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use pushhub_core::error::{AppError, ErrorKind};
use pushhub_core::result::AppResult;
use pushhub_core::types::{JobId, NotificationId};
use pushhub_database::store::{JobStore, StaleJobs};
use pushhub_entity::job::{
    CreateJob, DeliveryJob, DispatchJob, Job, JobPriority, JobStatus, job_types,
};

/// Job queue for enqueuing and claiming work.
#[derive(Debug, Clone)]
pub struct JobQueue {
    /// Durable job storage
    store: Arc<dyn JobStore>,
    /// Queue name jobs are enqueued to
    queue: String,
    /// Worker identifier recorded on claimed jobs
    worker_id: String,
}

impl JobQueue {
    /// Create a queue facade.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue: queue.into(),
            worker_id: worker_id.into(),
        }
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.queue
    }

    /// Worker identifier.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Enqueue a raw job.
    pub async fn enqueue(&self, params: CreateJob) -> AppResult<Job> {
        let job = self.store.create(&params).await?;
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            queue = %job.queue,
            priority = %job.priority,
            "Enqueued job"
        );
        Ok(job)
    }

    /// Enqueue one delivery attempt, runnable from `run_at` (now when `None`).
    ///
    /// Delivery jobs never use queue-level retries: a retry is a new job
    /// carrying the next `attempt_count`. Enqueueing the same attempt of the
    /// same pair twice returns the job already queued.
    pub async fn enqueue_delivery(
        &self,
        delivery: &DeliveryJob,
        run_at: Option<DateTime<Utc>>,
    ) -> AppResult<Job> {
        let payload = serde_json::to_value(delivery).map_err(|e| {
            AppError::with_source(ErrorKind::Serialization, "Failed to encode delivery job", e)
        })?;
        self.enqueue(CreateJob {
            job_type: job_types::PUSH_DELIVERY.to_string(),
            queue: self.queue.clone(),
            priority: JobPriority::Normal,
            payload,
            max_attempts: 1,
            scheduled_at: run_at,
            dedupe_key: Some(delivery.dedupe_key()),
        })
        .await
    }

    /// Enqueue the fan-out of a notification.
    pub async fn enqueue_dispatch(&self, notification_id: NotificationId) -> AppResult<Job> {
        let payload = serde_json::to_value(DispatchJob { notification_id }).map_err(|e| {
            AppError::with_source(ErrorKind::Serialization, "Failed to encode dispatch job", e)
        })?;
        self.enqueue(CreateJob {
            job_type: job_types::NOTIFICATION_DISPATCH.to_string(),
            queue: self.queue.clone(),
            priority: JobPriority::High,
            payload,
            max_attempts: 3,
            scheduled_at: None,
            dedupe_key: None,
        })
        .await
    }

    /// Enqueue a periodic maintenance task.
    pub async fn enqueue_task(&self, job_type: &str) -> AppResult<Job> {
        self.enqueue(CreateJob {
            job_type: job_type.to_string(),
            queue: self.queue.clone(),
            priority: JobPriority::Low,
            payload: serde_json::json!({ "task": job_type }),
            max_attempts: 1,
            scheduled_at: None,
            dedupe_key: None,
        })
        .await
    }

    /// Claim the next runnable job.
    pub async fn dequeue(&self) -> AppResult<Option<Job>> {
        let job = self.store.claim_next(&self.queue, &self.worker_id).await?;
        if let Some(job) = &job {
            debug!(job_id = %job.id, job_type = %job.job_type, "Dequeued job");
        }
        Ok(job)
    }

    /// Mark a job as completed with its result document.
    pub async fn complete(&self, job_id: JobId, result: Option<serde_json::Value>) -> AppResult<()> {
        self.store.complete(job_id, result.as_ref()).await
    }

    /// Mark a job as failed.
    pub async fn fail(&self, job_id: JobId, error: &str) -> AppResult<()> {
        self.store.fail(job_id, error).await
    }

    /// Return a running job to the queue after `delay`.
    pub async fn retry(&self, job_id: JobId, error: &str, delay: chrono::Duration) -> AppResult<()> {
        self.store.retry(job_id, error, Utc::now() + delay).await
    }

    /// Cancel a pending job.
    pub async fn cancel(&self, job_id: JobId) -> AppResult<bool> {
        self.store.cancel(job_id).await
    }

    /// Find a job.
    pub async fn find(&self, job_id: JobId) -> AppResult<Option<Job>> {
        self.store.find_by_id(job_id).await
    }

    /// Most recent jobs with a status.
    pub async fn list(&self, status: JobStatus, limit: i64) -> AppResult<Vec<Job>> {
        self.store.list_by_status(status, limit).await
    }

    /// Re-submit a failed or cancelled job as a new pending job.
    ///
    /// The payload is copied unchanged, so a delivery keeps its
    /// `attempt_count`.
    pub async fn resubmit(&self, job_id: JobId) -> AppResult<Job> {
        let job = self
            .find(job_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Job {job_id} not found")))?;
        if !job.status.can_resubmit() {
            return Err(AppError::conflict(format!(
                "Job {job_id} is {} and cannot be resubmitted",
                job.status
            )));
        }

        self.enqueue(CreateJob {
            job_type: job.job_type,
            queue: job.queue,
            priority: job.priority,
            payload: job.payload,
            max_attempts: job.max_attempts,
            scheduled_at: None,
            dedupe_key: None,
        })
        .await
    }

    /// Settle jobs left running longer than `lease`, as when their worker
    /// died or was killed past its shutdown grace.
    pub async fn reap_stale(&self, lease: chrono::Duration) -> AppResult<StaleJobs> {
        self.store.requeue_stale(Utc::now() - lease).await
    }

    /// Delete finished jobs older than `before`.
    pub async fn cleanup(&self, before: DateTime<Utc>) -> AppResult<u64> {
        self.store.cleanup_old(before).await
    }

    /// Job counts per status.
    pub async fn stats(&self) -> AppResult<QueueStats> {
        let mut stats = QueueStats {
            worker_id: self.worker_id.clone(),
            queue: self.queue.clone(),
            ..QueueStats::default()
        };
        for (status, count) in self.store.count_by_status().await? {
            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Running => stats.running = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
                JobStatus::Cancelled => stats.cancelled = count,
            }
        }
        Ok(stats)
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue name
    pub queue: String,
    /// Current worker identifier
    pub worker_id: String,
    /// Number of pending jobs
    pub pending: i64,
    /// Number of running jobs
    pub running: i64,
    /// Number of completed jobs
    pub completed: i64,
    /// Number of failed jobs
    pub failed: i64,
    /// Number of cancelled jobs
    pub cancelled: i64,
}
