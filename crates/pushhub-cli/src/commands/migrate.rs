//! Database migration management commands.

use clap::{Args, Subcommand};

use crate::output;
use pushhub_core::error::AppError;
use pushhub_database::DatabasePool;
use pushhub_database::migration;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: Option<MigrateCommand>,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations (default)
    Run,
    /// Show embedded migrations and whether each is applied
    Status,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, env: &str) -> Result<(), AppError> {
    let config = super::load_config(env)?;
    if config.database.is_memory() {
        return Err(AppError::configuration(
            "Migrations need database.provider = 'postgres'",
        ));
    }
    let pool = DatabasePool::connect(&config.database).await?;

    match args.command.as_ref().unwrap_or(&MigrateCommand::Run) {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            migration::run_migrations(pool.pool()).await?;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::Status => {
            let applied = migration::applied_versions(pool.pool())
                .await
                .unwrap_or_default();
            println!("Migration status:");
            for (version, description) in migration::embedded_migrations() {
                let state = if applied.contains(&version) {
                    "applied"
                } else {
                    "pending"
                };
                println!("  {version} - {description} ({state})");
            }
        }
    }

    pool.close().await;
    Ok(())
}
