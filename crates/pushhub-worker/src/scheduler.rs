//! Cron scheduler for periodic tasks.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info};

use pushhub_core::error::AppError;
use pushhub_entity::job::job_types;

use crate::queue::JobQueue;

/// Every minute, on the minute.
pub const SWEEP_SCHEDULE: &str = "0 * * * * *";
/// Every minute, on the half minute.
pub const REAP_SCHEDULE: &str = "30 * * * * *";
/// Daily at 03:00.
pub const CLEANUP_SCHEDULE: &str = "0 0 3 * * *";

/// Cron-based scheduler that enqueues periodic tasks
pub struct CronScheduler {
    scheduler: JobScheduler,
    queue: Arc<JobQueue>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler")
            .field("queue", &self.queue.name())
            .finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler
    pub async fn new(queue: Arc<JobQueue>) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self { scheduler, queue })
    }

    /// Register the scheduled sweep, the stale-job reaper, and the job cleanup
    pub async fn register_default_tasks(&self) -> Result<(), AppError> {
        self.register(SWEEP_SCHEDULE, job_types::SCHEDULED_SWEEP).await?;
        self.register(REAP_SCHEDULE, job_types::STALE_JOB_REAP).await?;
        self.register(CLEANUP_SCHEDULE, job_types::JOB_CLEANUP).await?;
        info!("All scheduled tasks registered");
        Ok(())
    }

    /// Enqueue a `job_type` task on every tick of `schedule`.
    pub async fn register(&self, schedule: &str, job_type: &'static str) -> Result<(), AppError> {
        let queue = Arc::clone(&self.queue);
        let job = CronJob::new_async(schedule, move |_uuid, _lock| {
            let queue = Arc::clone(&queue);
            Box::pin(async move {
                debug!(job_type, "Scheduling periodic task");
                if let Err(e) = queue.enqueue_task(job_type).await {
                    error!(job_type, error = %e, "Failed to enqueue periodic task");
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create {job_type} schedule: {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add {job_type} schedule: {e}")))?;

        info!(job_type, schedule, "Registered periodic task");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let mut scheduler = self.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        info!("Cron scheduler shut down");
        Ok(())
    }
}
