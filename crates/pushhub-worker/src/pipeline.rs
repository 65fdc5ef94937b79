//! Wiring of queue, delivery worker, dispatcher, and handlers.

use std::sync::Arc;

use tracing::info;

use pushhub_core::config::AppConfig;
use pushhub_database::store::Stores;
use pushhub_provider::SenderResolver;

use crate::dispatcher::NotificationDispatcher;
use crate::executor::JobExecutor;
use crate::jobs::{
    DeliveryWorker, DispatchJobHandler, JobCleanupHandler, ScheduledSweepHandler, StaleJobReaper,
};
use crate::queue::JobQueue;
use crate::retry::RetryPolicy;
use crate::runner::WorkerRunner;

/// Every delivery component, built once per process and shared by `Arc`.
#[derive(Debug, Clone)]
pub struct DeliveryPipeline {
    pub queue: Arc<JobQueue>,
    pub worker: Arc<DeliveryWorker>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub executor: Arc<JobExecutor>,
}

impl DeliveryPipeline {
    /// Build the pipeline for `worker_id`.
    pub fn new(
        config: &AppConfig,
        stores: &Stores,
        resolver: Arc<dyn SenderResolver>,
        worker_id: impl Into<String>,
    ) -> Self {
        let queue = Arc::new(JobQueue::new(
            stores.jobs.clone(),
            config.worker.queue.clone(),
            worker_id,
        ));
        let worker = Arc::new(DeliveryWorker::new(
            stores,
            resolver,
            queue.clone(),
            RetryPolicy::new(&config.retry),
            config.worker.send_timeout(),
        ));
        let dispatcher = Arc::new(
            NotificationDispatcher::new(stores, queue.clone(), worker.clone())
                .with_lease(config.worker.job_lease()),
        );

        let mut executor = JobExecutor::new();
        executor.register(worker.clone());
        executor.register(Arc::new(DispatchJobHandler::new(dispatcher.clone())));
        executor.register(Arc::new(ScheduledSweepHandler::new(dispatcher.clone())));
        executor.register(Arc::new(JobCleanupHandler::new(
            queue.clone(),
            config.worker.job_retention_days,
        )));
        executor.register(Arc::new(StaleJobReaper::new(
            queue.clone(),
            config.worker.job_lease(),
        )));
        info!(
            queue = %queue.name(),
            worker_id = %queue.worker_id(),
            "Delivery pipeline ready"
        );

        Self {
            queue,
            worker,
            dispatcher,
            executor: Arc::new(executor),
        }
    }

    /// Runner over this pipeline's queue and handlers.
    pub fn runner(&self, config: &AppConfig) -> WorkerRunner {
        WorkerRunner::new(self.queue.clone(), self.executor.clone(), config.worker.clone())
    }
}
