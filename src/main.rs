//! PushHub delivery engine.
//!
//! Wires configuration, stores, cache, provider registry, and the delivery
//! pipeline together, then runs the worker until Ctrl+C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use pushhub_cache::CacheManager;
use pushhub_core::config::AppConfig;
use pushhub_core::error::AppError;
use pushhub_database::DatabasePool;
use pushhub_database::store::Stores;
use pushhub_provider::ProviderRegistry;
use pushhub_worker::{CronScheduler, DeliveryPipeline};

#[tokio::main]
async fn main() {
    let env = std::env::var("PUSHHUB_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Engine error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting PushHub engine v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Stores + migrations ──────────────────────────────
    let stores = if config.database.is_memory() {
        tracing::warn!("Using in-memory stores; nothing survives a restart");
        Stores::memory()
    } else {
        tracing::info!("Connecting to database...");
        let pool = DatabasePool::connect(&config.database).await?;
        if config.database.run_migrations {
            pushhub_database::migration::run_migrations(pool.pool()).await?;
        }
        Stores::postgres(&pool)
    };

    // ── Step 2: Cache ────────────────────────────────────────────
    tracing::info!(provider = %config.cache.provider, "Initializing cache...");
    let cache = CacheManager::new(&config.cache).await?;

    // ── Step 3: Provider registry ────────────────────────────────
    let registry = ProviderRegistry::new(
        stores.credentials.clone(),
        cache,
        config.providers.clone(),
        &config.credentials,
    )?;
    tracing::info!("Provider registry initialized");

    // ── Step 4: Delivery pipeline ────────────────────────────────
    let worker_id = format!("worker-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    let pipeline = DeliveryPipeline::new(&config, &stores, Arc::new(registry), worker_id);

    // ── Step 5: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 6: Worker runner ────────────────────────────────────
    let worker_handle = if config.worker.enabled {
        let runner = pipeline.runner(&config);
        let cancel = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            runner.run(cancel).await;
        }))
    } else {
        tracing::info!("Delivery worker disabled");
        None
    };

    // ── Step 7: Cron scheduler ───────────────────────────────────
    let scheduler = if config.worker.scheduler_enabled {
        let scheduler = CronScheduler::new(pipeline.queue.clone()).await?;
        scheduler.register_default_tasks().await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Cron scheduler disabled");
        None
    };

    // ── Step 8: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
    let _ = shutdown_tx.send(true);

    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
        }
    }

    if let Some(handle) = worker_handle {
        let wait = Duration::from_secs(config.worker.shutdown_grace_seconds + 5);
        if tokio::time::timeout(wait, handle).await.is_err() {
            tracing::warn!("Worker did not stop in time");
        }
    }

    tracing::info!("PushHub engine shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
