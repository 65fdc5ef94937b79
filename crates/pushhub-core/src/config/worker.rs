//! Delivery worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delivery worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of jobs processed in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Interval in seconds between polls of an empty queue.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Queue name consumed by this worker.
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Global ceiling on jobs started per second.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u32,
    /// Upper bound on a single provider `send` call.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_seconds: u64,
    /// Time granted to in-flight jobs after a shutdown signal.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// Whether the cron scheduler (scheduled sweep, job cleanup) runs.
    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,
    /// Finished jobs older than this many days are purged.
    #[serde(default = "default_job_retention")]
    pub job_retention_days: i64,
    /// Running jobs and dispatch claims older than this are treated as
    /// abandoned by a dead worker.
    #[serde(default = "default_job_lease")]
    pub job_lease_seconds: u64,
}

impl WorkerConfig {
    /// Provider send timeout as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Job lease as a [`chrono::Duration`].
    pub fn job_lease(&self) -> chrono::Duration {
        let seconds = self.job_lease_seconds.min(u64::from(u32::MAX));
        chrono::Duration::seconds(seconds as i64)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            concurrency: default_concurrency(),
            poll_interval_seconds: default_poll_interval(),
            queue: default_queue(),
            rate_limit_per_second: default_rate_limit(),
            send_timeout_seconds: default_send_timeout(),
            shutdown_grace_seconds: default_shutdown_grace(),
            scheduler_enabled: default_true(),
            job_retention_days: default_job_retention(),
            job_lease_seconds: default_job_lease(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    10
}

fn default_poll_interval() -> u64 {
    1
}

fn default_queue() -> String {
    "push".to_string()
}

fn default_rate_limit() -> u32 {
    100
}

fn default_send_timeout() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_job_retention() -> i64 {
    7
}

fn default_job_lease() -> u64 {
    300
}
