//! CLI command definitions and dispatch.

pub mod config;
pub mod job;
pub mod migrate;
pub mod notification;
pub mod vapid;
pub mod worker;

use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::output::{self, OutputFormat};
use pushhub_cache::CacheManager;
use pushhub_core::config::AppConfig;
use pushhub_core::error::AppError;
use pushhub_database::DatabasePool;
use pushhub_database::store::Stores;
use pushhub_provider::ProviderRegistry;
use pushhub_worker::DeliveryPipeline;

/// PushHub: push notification delivery engine
#[derive(Debug, Parser)]
#[command(name = "pushhub", version, about, long_about = None)]
pub struct Cli {
    /// Configuration overlay to merge over config/default.toml
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// VAPID key tooling
    Vapid(vapid::VapidArgs),
    /// Worker and queue management
    Worker(worker::WorkerArgs),
    /// Job inspection and re-submission
    Job(job::JobArgs),
    /// Notification dispatch, cancellation, and ledger tools
    Notification(notification::NotificationArgs),
    /// Configuration inspection
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &self.env).await,
            Commands::Vapid(args) => vapid::execute(args, self.format),
            Commands::Worker(args) => worker::execute(args, &self.env, self.format).await,
            Commands::Job(args) => job::execute(args, &self.env, self.format).await,
            Commands::Notification(args) => {
                notification::execute(args, &self.env, self.format).await
            }
            Commands::Config(args) => config::execute(args, &self.env, self.format),
        }
    }
}

/// Helper: load configuration for an environment
pub fn load_config(env: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(env)
}

/// Helper: connect the configured stores
pub async fn connect_stores(config: &AppConfig) -> Result<Stores, AppError> {
    if config.database.is_memory() {
        output::print_warning(
            "database.provider is 'memory': this process sees only its own empty store",
        );
        return Ok(Stores::memory());
    }
    let pool = DatabasePool::connect(&config.database).await?;
    Ok(Stores::postgres(&pool))
}

/// Helper: build the delivery pipeline against live providers
pub async fn build_pipeline(config: &AppConfig, stores: &Stores) -> Result<DeliveryPipeline, AppError> {
    let cache = CacheManager::new(&config.cache).await?;
    let registry = ProviderRegistry::new(
        stores.credentials.clone(),
        cache,
        config.providers.clone(),
        &config.credentials,
    )?;
    let worker_id = format!("cli-{}", std::process::id());
    Ok(DeliveryPipeline::new(config, stores, Arc::new(registry), worker_id))
}

/// Helper: parse an identifier argument
pub fn parse_id<T: FromStr>(kind: &str, value: &str) -> Result<T, AppError> {
    value
        .parse()
        .map_err(|_| AppError::validation(format!("Invalid {kind} id: '{value}'")))
}
