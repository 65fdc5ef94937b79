//! Job inspection and manual re-submission.

use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use pushhub_core::error::AppError;
use pushhub_core::types::JobId;
use pushhub_entity::job::{Job, JobStatus};
use pushhub_worker::JobQueue;

/// Arguments for job commands
#[derive(Debug, Args)]
pub struct JobArgs {
    /// Job subcommand
    #[command(subcommand)]
    pub command: JobCommand,
}

/// Status filter accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl From<StatusArg> for JobStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => JobStatus::Pending,
            StatusArg::Running => JobStatus::Running,
            StatusArg::Completed => JobStatus::Completed,
            StatusArg::Failed => JobStatus::Failed,
            StatusArg::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// Job subcommands
#[derive(Debug, Subcommand)]
pub enum JobCommand {
    /// List recent jobs with a status
    List {
        #[arg(short, long, value_enum, default_value = "failed")]
        status: StatusArg,
        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },
    /// Show one job with its payload and result
    Show { job_id: String },
    /// Enqueue a copy of a failed or cancelled job
    Resubmit { job_id: String },
    /// Cancel a pending job
    Cancel { job_id: String },
}

#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    id: String,
    #[tabled(rename = "type")]
    job_type: String,
    status: String,
    attempts: i32,
    scheduled_at: String,
    error: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            job_type: job.job_type.clone(),
            status: job.status.to_string(),
            attempts: job.attempts,
            scheduled_at: job.scheduled_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            error: output::or_dash(job.error_message.as_deref()),
        }
    }
}

/// Execute job commands
pub async fn execute(args: &JobArgs, env: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(env)?;
    let stores = super::connect_stores(&config).await?;
    let queue = JobQueue::new(stores.jobs.clone(), config.worker.queue.clone(), "cli");

    match &args.command {
        JobCommand::List { status, limit } => {
            let jobs = queue.list((*status).into(), *limit).await?;
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            output::print_list(&rows, format);
        }
        JobCommand::Show { job_id } => {
            let id: JobId = super::parse_id("job", job_id)?;
            let job = queue
                .find(id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;
            output::print_item(&job, format);
        }
        JobCommand::Resubmit { job_id } => {
            let id: JobId = super::parse_id("job", job_id)?;
            let job = queue.resubmit(id).await?;
            output::print_success(&format!("Job {id} resubmitted as {}", job.id));
        }
        JobCommand::Cancel { job_id } => {
            let id: JobId = super::parse_id("job", job_id)?;
            if queue.cancel(id).await? {
                output::print_success(&format!("Job {id} cancelled"));
            } else {
                output::print_warning(&format!("Job {id} is not pending; nothing cancelled"));
            }
        }
    }

    Ok(())
}
