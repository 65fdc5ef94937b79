//! Configuration inspection commands.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use pushhub_core::error::AppError;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration with secrets masked
    Show,
    /// Load the configuration and report problems
    Validate,
}

/// Execute config commands
pub fn execute(args: &ConfigArgs, env: &str, format: OutputFormat) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let config = super::load_config(env)?;
            output::print_item(&config.redacted(), format);
        }
        ConfigCommand::Validate => {
            let config = super::load_config(env)?.redacted();
            output::print_success(&format!("Configuration for '{env}' is valid"));
            output::print_kv("Database", &config.database.url);
            output::print_kv("Cache", &config.cache.provider);
            output::print_kv("Queue", &config.worker.queue);
            output::print_kv(
                "VAPID policy",
                &config.retry.vapid_forbidden_policy.to_string(),
            );
        }
    }
    Ok(())
}
