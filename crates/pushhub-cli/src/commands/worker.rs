//! Worker and queue commands.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use pushhub_core::error::AppError;
use pushhub_worker::JobQueue;

/// Arguments for worker commands
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Worker subcommand
    #[command(subcommand)]
    pub command: WorkerCommand,
}

/// Worker subcommands
#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Show queue counts and worker settings
    Status,
    /// Run every currently runnable job in this process, then exit
    Drain,
}

/// Execute worker commands
pub async fn execute(args: &WorkerArgs, env: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(env)?;
    let stores = super::connect_stores(&config).await?;

    match &args.command {
        WorkerCommand::Status => {
            let queue = JobQueue::new(stores.jobs.clone(), config.worker.queue.clone(), "cli");
            let stats = queue.stats().await?;
            match format {
                OutputFormat::Json => output::print_item(
                    &serde_json::json!({ "queue": stats, "worker": config.worker }),
                    format,
                ),
                OutputFormat::Table => {
                    println!("Queue '{}':", stats.queue);
                    output::print_kv("Pending", &stats.pending.to_string());
                    output::print_kv("Running", &stats.running.to_string());
                    output::print_kv("Completed", &stats.completed.to_string());
                    output::print_kv("Failed", &stats.failed.to_string());
                    output::print_kv("Cancelled", &stats.cancelled.to_string());
                    println!("Worker:");
                    output::print_kv("Enabled", &config.worker.enabled.to_string());
                    output::print_kv("Concurrency", &config.worker.concurrency.to_string());
                    output::print_kv(
                        "Rate limit (jobs/s)",
                        &config.worker.rate_limit_per_second.to_string(),
                    );
                    output::print_kv(
                        "Send timeout (s)",
                        &config.worker.send_timeout_seconds.to_string(),
                    );
                    output::print_kv(
                        "Job lease (s)",
                        &config.worker.job_lease_seconds.to_string(),
                    );
                }
            }
        }
        WorkerCommand::Drain => {
            let pipeline = super::build_pipeline(&config, &stores).await?;
            let report = pipeline.runner(&config).drain().await;
            output::print_item(&report, format);
        }
    }

    Ok(())
}
