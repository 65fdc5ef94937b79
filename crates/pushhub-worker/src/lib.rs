//! Delivery pipeline for PushHub.
//!
//! This crate provides:
//! - A notification dispatcher that fans notifications out into delivery jobs
//! - The delivery worker: one provider send per job, outcome recorded in the ledger
//! - The retry policy that classifies failures and schedules backoff
//! - A worker runner bounded by concurrency and a global start rate
//! - A cron scheduler for the scheduled sweep, stale-job reaping, and job cleanup

pub mod dispatcher;
pub mod executor;
pub mod jobs;
pub mod ledger;
pub mod pipeline;
pub mod queue;
pub mod rate_limit;
pub mod retry;
pub mod runner;
pub mod scheduler;

pub use dispatcher::{DispatchOutcome, DispatchSummary, NotificationDispatcher};
pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use jobs::{DeliveryState, DeliveryWorker};
pub use ledger::DeliveryLedger;
pub use pipeline::DeliveryPipeline;
pub use queue::{JobQueue, QueueStats};
pub use rate_limit::RateLimiter;
pub use retry::{FailureClass, RetryDecision, RetryPolicy};
pub use runner::{DrainReport, WorkerRunner};
pub use scheduler::CronScheduler;
