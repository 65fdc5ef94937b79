//! `scheduled_sweep` handler: dispatch notifications whose time has come.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use pushhub_entity::job::{Job, job_types};

use super::classify_app_error;
use crate::dispatcher::{DispatchOutcome, NotificationDispatcher};
use crate::executor::{JobExecutionError, JobHandler};

/// Notifications dispatched per sweep run.
pub const DEFAULT_SWEEP_BATCH: i64 = 100;

/// Periodic sweep of due notifications.
#[derive(Debug)]
pub struct ScheduledSweepHandler {
    dispatcher: Arc<NotificationDispatcher>,
    batch_size: i64,
}

impl ScheduledSweepHandler {
    /// Create a sweep handler.
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            dispatcher,
            batch_size: DEFAULT_SWEEP_BATCH,
        }
    }

    /// Override the batch size.
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl JobHandler for ScheduledSweepHandler {
    fn job_type(&self) -> &str {
        job_types::SCHEDULED_SWEEP
    }

    async fn execute(&self, _job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let summaries = self
            .dispatcher
            .sweep(Utc::now(), self.batch_size)
            .await
            .map_err(classify_app_error)?;

        let dispatched = summaries
            .iter()
            .filter(|s| s.outcome == DispatchOutcome::Dispatched)
            .count();
        let no_targets = summaries
            .iter()
            .filter(|s| s.outcome == DispatchOutcome::NoTargets)
            .count();
        if !summaries.is_empty() {
            info!(found = summaries.len(), dispatched, no_targets, "Scheduled sweep finished");
        }

        Ok(Some(serde_json::json!({
            "task": job_types::SCHEDULED_SWEEP,
            "found": summaries.len(),
            "dispatched": dispatched,
            "no_targets": no_targets,
        })))
    }
}
