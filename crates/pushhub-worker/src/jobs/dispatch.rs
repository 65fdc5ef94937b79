//! `notification_dispatch` handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use pushhub_entity::job::{DispatchJob, Job, job_types};

use super::classify_app_error;
use crate::dispatcher::NotificationDispatcher;
use crate::executor::{JobExecutionError, JobHandler};

/// Runs the fan-out of one notification, holding the dispatch claim under
/// the job's ID so a re-run of the same job resumes it.
#[derive(Debug)]
pub struct DispatchJobHandler {
    dispatcher: Arc<NotificationDispatcher>,
}

impl DispatchJobHandler {
    /// Create a dispatch handler.
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl JobHandler for DispatchJobHandler {
    fn job_type(&self) -> &str {
        job_types::NOTIFICATION_DISPATCH
    }

    async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let payload: DispatchJob = serde_json::from_value(job.payload.clone())
            .map_err(|e| JobExecutionError::Permanent(format!("Invalid dispatch payload: {e}")))?;

        let summary = self
            .dispatcher
            .dispatch_as(payload.notification_id, &job.id.to_string())
            .await
            .map_err(classify_app_error)?;

        serde_json::to_value(&summary)
            .map(Some)
            .map_err(|e| JobExecutionError::Permanent(format!("Failed to encode result: {e}")))
    }
}
