//! Worker runner: claims jobs under a concurrency bound and a start-rate
//! ceiling and hands them to the executor.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};
use tokio::time;
use tracing::{debug, error, info, trace, warn};

use pushhub_core::config::WorkerConfig;
use pushhub_entity::job::Job;

use crate::executor::{JobExecutionError, JobExecutor};
use crate::queue::JobQueue;
use crate::rate_limit::RateLimiter;

/// Queue-level backoff for transient handler errors, per attempt already made.
const QUEUE_RETRY_STEP_SECONDS: i64 = 30;

/// What happened to a claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRun {
    Completed,
    Requeued,
    Failed,
}

/// Totals from [`WorkerRunner::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub processed: usize,
    pub completed: usize,
    pub requeued: usize,
    pub failed: usize,
}

/// Main worker runner that polls the queue and executes jobs
#[derive(Debug)]
pub struct WorkerRunner {
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    limiter: RateLimiter,
    config: WorkerConfig,
}

impl WorkerRunner {
    /// Create a runner. The rate limiter is built from `config`.
    pub fn new(queue: Arc<JobQueue>, executor: Arc<JobExecutor>, config: WorkerConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config.rate_limit_per_second),
            queue,
            executor,
            config,
        }
    }

    /// Share a limiter with other runners in the process.
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Run until the cancel signal flips to `true` or its sender is dropped,
    /// then wait up to the shutdown grace period for in-flight jobs.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        let concurrency = self.config.concurrency.max(1);
        info!(
            worker_id = %self.queue.worker_id(),
            queue = %self.queue.name(),
            concurrency,
            rate_limit_per_second = self.config.rate_limit_per_second,
            poll_interval_seconds = self.config.poll_interval_seconds,
            handlers = ?self.executor.registered_types(),
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let poll_interval = self.config.poll_interval();

        loop {
            if *cancel.borrow() {
                break;
            }

            let permit = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
                _ = self.limiter.acquire() => {}
            }

            match self.queue.dequeue().await {
                Ok(Some(job)) => {
                    let queue = Arc::clone(&self.queue);
                    let executor = Arc::clone(&self.executor);
                    tokio::spawn(async move {
                        let _permit = permit;
                        run_job(&queue, &executor, job).await;
                    });
                    continue;
                }
                Ok(None) => {
                    drop(permit);
                    trace!("No runnable jobs");
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "Failed to dequeue job");
                }
            }

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = time::sleep(poll_interval) => {}
            }
        }

        info!(worker_id = %self.queue.worker_id(), "Worker waiting for in-flight jobs");
        let grace = Duration::from_secs(self.config.shutdown_grace_seconds);
        let permits = u32::try_from(concurrency).unwrap_or(u32::MAX);
        if time::timeout(grace, semaphore.acquire_many(permits)).await.is_err() {
            warn!(
                grace_seconds = self.config.shutdown_grace_seconds,
                "In-flight jobs still running after shutdown grace period"
            );
        }
        info!(worker_id = %self.queue.worker_id(), "Worker shut down");
    }

    /// Run every currently runnable job to completion, one at a time, then
    /// return. Jobs scheduled in the future are left alone.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            self.limiter.acquire().await;
            let job = match self.queue.dequeue().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to dequeue job while draining");
                    break;
                }
            };

            report.processed += 1;
            match run_job(&self.queue, &self.executor, job).await {
                JobRun::Completed => report.completed += 1,
                JobRun::Requeued => report.requeued += 1,
                JobRun::Failed => report.failed += 1,
            }
        }
        debug!(?report, "Queue drained");
        report
    }
}

/// Execute one claimed job and settle it on the queue.
pub async fn run_job(queue: &JobQueue, executor: &JobExecutor, job: Job) -> JobRun {
    let job_id = job.id;
    debug!(
        job_id = %job_id,
        job_type = %job.job_type,
        attempt = job.attempts,
        max_attempts = job.max_attempts,
        "Processing job"
    );

    let (run, settled) = match executor.execute(&job).await {
        Ok(result) => (JobRun::Completed, queue.complete(job_id, result).await),
        Err(JobExecutionError::Transient(msg)) if job.can_retry() => {
            warn!(job_id = %job_id, error = %msg, "Job failed (transient), requeueing");
            let delay = chrono::Duration::seconds(QUEUE_RETRY_STEP_SECONDS * i64::from(job.attempts));
            (JobRun::Requeued, queue.retry(job_id, &msg, delay).await)
        }
        Err(JobExecutionError::Transient(msg)) | Err(JobExecutionError::Permanent(msg)) => {
            error!(job_id = %job_id, job_type = %job.job_type, error = %msg, "Job failed");
            (JobRun::Failed, queue.fail(job_id, &msg).await)
        }
        Err(JobExecutionError::Internal(err)) => {
            let msg = err.to_string();
            error!(job_id = %job_id, job_type = %job.job_type, error = %msg, "Job internal error");
            (JobRun::Failed, queue.fail(job_id, &msg).await)
        }
    };

    if let Err(e) = settled {
        error!(job_id = %job_id, error = %e, "Failed to record job status");
    }
    run
}
