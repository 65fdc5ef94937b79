//! Fan-out, the queue-down fallback, scheduled sweeps, and the runner.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;

use pushhub_core::config::{RetryConfig, WorkerConfig};
use pushhub_core::types::AppId;
use pushhub_database::MemoryStore;
use pushhub_database::store::Stores;
use pushhub_entity::delivery::DeliveryStatus;
use pushhub_entity::device::Platform;
use pushhub_entity::job::{CreateJob, DeliveryJob, Job, JobPriority, JobStatus, job_types};
use pushhub_entity::notification::{DispatchClaim, NotificationStatus};
use pushhub_provider::SendResult;
use pushhub_worker::jobs::{
    DispatchJobHandler, JobCleanupHandler, ScheduledSweepHandler, StaleJobReaper,
};
use pushhub_worker::{
    DispatchOutcome, DispatchSummary, JobExecutionError, JobExecutor, JobHandler,
    NotificationDispatcher, WorkerRunner,
};

use common::{FlakyDevices, Harness, QUEUE, UnavailableQueue};

fn dispatcher(harness: &Harness) -> Arc<NotificationDispatcher> {
    Arc::new(NotificationDispatcher::new(
        &harness.stores,
        harness.queue.clone(),
        harness.worker.clone(),
    ))
}

fn executor(harness: &Harness, dispatcher: &Arc<NotificationDispatcher>) -> Arc<JobExecutor> {
    let mut executor = JobExecutor::new();
    executor.register(harness.worker.clone());
    executor.register(Arc::new(DispatchJobHandler::new(dispatcher.clone())));
    executor.register(Arc::new(ScheduledSweepHandler::new(dispatcher.clone())));
    executor.register(Arc::new(JobCleanupHandler::new(harness.queue.clone(), 7)));
    executor.register(Arc::new(StaleJobReaper::new(
        harness.queue.clone(),
        chrono::Duration::minutes(5),
    )));
    Arc::new(executor)
}

/// Harness whose first `failures` device lookups error out.
fn flaky_harness(failures: usize) -> Harness {
    let memory = Arc::new(MemoryStore::new());
    let mut stores = Stores::from_memory(memory.clone());
    stores.devices = Arc::new(FlakyDevices::new(memory, failures));
    Harness::with_stores(
        stores,
        Platform::Android,
        RetryConfig::default(),
        |resolver| resolver,
        None,
        Duration::from_secs(5),
    )
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        concurrency: 4,
        rate_limit_per_second: 0,
        ..WorkerConfig::default()
    }
}

#[tokio::test]
async fn test_dispatch_enqueues_one_job_per_device() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let app_id = AppId::new();
    let notification = harness.notification(app_id).await;
    harness.device(app_id, Platform::Android, "fcm-1").await;
    harness.device(app_id, Platform::Android, "fcm-2").await;
    harness.device(AppId::new(), Platform::Android, "other-app").await;

    let summary = dispatcher.dispatch(notification.id).await.unwrap();
    assert_eq!(summary.outcome, DispatchOutcome::Dispatched);
    assert_eq!(summary.total_targets, 2);
    assert_eq!(summary.enqueued, 2);
    assert_eq!(summary.delivered_inline, 0);

    let stored = harness.reload(&notification).await;
    assert_eq!(stored.status, NotificationStatus::Sent);
    assert_eq!(stored.total_targets, 2);
    assert_eq!(harness.pending_jobs().await.len(), 2);
    assert_eq!(harness.sender.calls(), 0);

    let again = dispatcher.dispatch(notification.id).await.unwrap();
    assert_eq!(again.outcome, DispatchOutcome::Skipped);
    assert_eq!(harness.pending_jobs().await.len(), 2);
}

#[tokio::test]
async fn test_dispatch_without_devices_fails_notification() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let notification = harness.notification(AppId::new()).await;

    let summary = dispatcher.dispatch(notification.id).await.unwrap();
    assert_eq!(summary.outcome, DispatchOutcome::NoTargets);

    let stored = harness.reload(&notification).await;
    assert_eq!(stored.status, NotificationStatus::Failed);
    assert_eq!(stored.failure_reason.as_deref(), Some("No deliverable devices"));
    assert_eq!(stored.total_targets, 0);
}

#[tokio::test]
async fn test_cancelled_notification_is_not_dispatched() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let app_id = AppId::new();
    let notification = harness.notification(app_id).await;
    harness.device(app_id, Platform::Android, "fcm-1").await;

    assert!(dispatcher.cancel(notification.id).await.unwrap());
    let summary = dispatcher.dispatch(notification.id).await.unwrap();
    assert_eq!(summary.outcome, DispatchOutcome::Skipped);
    assert!(harness.pending_jobs().await.is_empty());
    assert_eq!(
        harness.reload(&notification).await.status,
        NotificationStatus::Cancelled
    );
}

#[tokio::test]
async fn test_queue_down_delivers_inline() {
    let memory = Arc::new(MemoryStore::new());
    let mut stores = Stores::from_memory(memory.clone());
    stores.jobs = Arc::new(UnavailableQueue(memory));
    let harness = Harness::with_stores(
        stores,
        Platform::Android,
        RetryConfig::default(),
        |resolver| resolver,
        None,
        Duration::from_secs(5),
    );
    let dispatcher = dispatcher(&harness);
    let app_id = AppId::new();
    let notification = harness.notification(app_id).await;
    harness.device(app_id, Platform::Android, "fcm-1").await;
    harness.device(app_id, Platform::Android, "fcm-2").await;

    let summary = dispatcher
        .submit(notification.id)
        .await
        .unwrap()
        .expect("dispatched synchronously");
    assert_eq!(summary.outcome, DispatchOutcome::Dispatched);
    assert_eq!(summary.enqueued, 0);
    assert_eq!(summary.delivered_inline, 2);
    assert_eq!(harness.sender.calls(), 2);
    assert_eq!(harness.counters(&notification).await, (2, 2, 0));
    assert_eq!(
        harness.reload(&notification).await.status,
        NotificationStatus::Sent
    );
}

#[tokio::test]
async fn test_submit_queues_dispatch_job() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let notification = harness.notification(AppId::new()).await;

    assert!(dispatcher.submit(notification.id).await.unwrap().is_none());
    let pending = harness.pending_jobs().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].job_type, job_types::NOTIFICATION_DISPATCH);
    assert_eq!(pending[0].priority, JobPriority::High);
}

#[tokio::test]
async fn test_sweep_dispatches_due_scheduled_notifications() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let app_id = AppId::new();
    harness.device(app_id, Platform::Android, "fcm-1").await;
    let due = harness
        .notification_at(app_id, Some(Utc::now() - chrono::Duration::seconds(5)))
        .await;
    let later = harness
        .notification_at(app_id, Some(Utc::now() + chrono::Duration::hours(1)))
        .await;
    assert_eq!(due.status, NotificationStatus::Scheduled);

    let summaries = dispatcher.sweep(Utc::now(), 10).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].notification_id, due.id);
    assert_eq!(harness.reload(&due).await.status, NotificationStatus::Sent);
    assert_eq!(harness.reload(&later).await.status, NotificationStatus::Scheduled);
}

#[tokio::test]
async fn test_drain_runs_dispatch_and_deliveries() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let runner = WorkerRunner::new(
        harness.queue.clone(),
        executor(&harness, &dispatcher),
        worker_config(),
    );
    let app_id = AppId::new();
    let notification = harness.notification(app_id).await;
    for i in 0..3 {
        harness.device(app_id, Platform::Android, &format!("fcm-{i}")).await;
    }
    dispatcher.submit(notification.id).await.unwrap();

    let report = runner.drain().await;
    assert_eq!(report.processed, 4);
    assert_eq!(report.completed, 4);
    assert_eq!(harness.counters(&notification).await, (3, 3, 0));
    assert!(harness.pending_jobs().await.is_empty());
}

#[tokio::test]
async fn test_run_processes_until_cancelled() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let runner = Arc::new(WorkerRunner::new(
        harness.queue.clone(),
        executor(&harness, &dispatcher),
        WorkerConfig {
            rate_limit_per_second: 100,
            ..worker_config()
        },
    ));
    let app_id = AppId::new();
    let notification = harness.notification(app_id).await;
    for i in 0..5 {
        harness.device(app_id, Platform::Android, &format!("fcm-{i}")).await;
    }
    dispatcher.dispatch(notification.id).await.unwrap();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let handle = tokio::spawn({
        let runner = runner.clone();
        async move { runner.run(cancel_rx).await }
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while harness.counters(&notification).await.0 < 5 {
        assert!(tokio::time::Instant::now() < deadline, "deliveries did not finish");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("runner stops after cancel")
        .unwrap();
    assert_eq!(harness.sender.calls(), 5);
}

#[derive(Debug)]
struct Flaky {
    calls: AtomicUsize,
}

#[async_trait]
impl JobHandler for Flaky {
    fn job_type(&self) -> &str {
        "flaky"
    }

    async fn execute(&self, _job: &Job) -> Result<Option<Value>, JobExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(JobExecutionError::Transient("upstream busy".into()))
    }
}

#[tokio::test]
async fn test_transient_handler_error_requeues_then_fails() {
    let harness = Harness::new(Platform::Android);
    let mut executor = JobExecutor::new();
    executor.register(Arc::new(Flaky {
        calls: AtomicUsize::new(0),
    }));
    let runner = WorkerRunner::new(harness.queue.clone(), Arc::new(executor), worker_config());

    let retried = harness
        .queue
        .enqueue(CreateJob {
            job_type: "flaky".to_string(),
            queue: QUEUE.to_string(),
            priority: JobPriority::Normal,
            payload: serde_json::json!({}),
            max_attempts: 3,
            scheduled_at: None,
            dedupe_key: None,
        })
        .await
        .unwrap();
    let once = harness.queue.enqueue_task("flaky").await.unwrap();
    let unknown = harness.queue.enqueue_task("no_such_job").await.unwrap();

    let report = runner.drain().await;
    assert_eq!(report.processed, 3);
    assert_eq!(report.requeued, 1);
    assert_eq!(report.failed, 2);

    let find = |id| {
        let queue = harness.queue.clone();
        async move { queue.find(id).await.unwrap().unwrap() }
    };
    let retried = find(retried.id).await;
    assert_eq!(retried.status, JobStatus::Pending);
    assert!(retried.scheduled_at > Utc::now());
    assert_eq!(find(once.id).await.status, JobStatus::Failed);
    let unknown = find(unknown.id).await;
    assert_eq!(unknown.status, JobStatus::Failed);
    assert!(unknown.error_message.unwrap().contains("No handler registered"));
}

#[tokio::test(start_paused = true)]
async fn test_drain_respects_start_rate() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let runner = WorkerRunner::new(
        harness.queue.clone(),
        executor(&harness, &dispatcher),
        WorkerConfig {
            rate_limit_per_second: 5,
            ..worker_config()
        },
    );
    for _ in 0..10 {
        harness.queue.enqueue_task(job_types::JOB_CLEANUP).await.unwrap();
    }

    let started = tokio::time::Instant::now();
    let report = runner.drain().await;
    assert_eq!(report.completed, 10);
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_dispatch_job_recovers_from_store_error_after_claim() {
    let harness = flaky_harness(1);
    let dispatcher = dispatcher(&harness);
    let runner = WorkerRunner::new(
        harness.queue.clone(),
        executor(&harness, &dispatcher),
        worker_config(),
    );
    let app_id = AppId::new();
    let notification = harness.notification(app_id).await;
    harness.device(app_id, Platform::Android, "fcm-1").await;
    harness.device(app_id, Platform::Android, "fcm-2").await;
    dispatcher.submit(notification.id).await.unwrap();

    let report = runner.drain().await;
    assert_eq!(report.requeued, 1);
    let stored = harness.reload(&notification).await;
    assert_eq!(stored.status, NotificationStatus::Pending);
    assert!(stored.dispatch_started_at.is_none());
    assert!(stored.dispatch_claim.is_none());

    let pending = harness.pending_jobs().await;
    assert_eq!(pending.len(), 1);
    let dispatch_job = pending[0].clone();
    assert_eq!(dispatch_job.job_type, job_types::NOTIFICATION_DISPATCH);
    assert_eq!(dispatch_job.attempts, 1);

    let handler = DispatchJobHandler::new(dispatcher.clone());
    let result = handler.execute(&dispatch_job).await.unwrap().unwrap();
    let summary: DispatchSummary = serde_json::from_value(result).unwrap();
    assert_eq!(summary.outcome, DispatchOutcome::Dispatched);
    assert_eq!(summary.enqueued, 2);

    let stored = harness.reload(&notification).await;
    assert_eq!(stored.status, NotificationStatus::Sent);
    assert_eq!(stored.total_targets, 2);
    let deliveries = harness
        .pending_jobs()
        .await
        .into_iter()
        .filter(|j| j.job_type == job_types::PUSH_DELIVERY)
        .count();
    assert_eq!(deliveries, 2);
}

#[tokio::test]
async fn test_resumed_claim_does_not_enqueue_devices_twice() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let app_id = AppId::new();
    let notification = harness.notification(app_id).await;
    let first = harness.device(app_id, Platform::Android, "fcm-1").await;
    harness.device(app_id, Platform::Android, "fcm-2").await;
    dispatcher.submit(notification.id).await.unwrap();
    let dispatch_job = harness.pending_jobs().await.remove(0);

    // A previous run of the same job claimed and queued one device, then died.
    let held = harness
        .stores
        .notifications
        .claim_for_dispatch(
            notification.id,
            &DispatchClaim::new(dispatch_job.id.to_string(), chrono::Duration::minutes(5)),
        )
        .await
        .unwrap()
        .unwrap();
    harness
        .queue
        .enqueue_delivery(&DeliveryJob::for_device(&held, &first), None)
        .await
        .unwrap();

    let other = dispatcher.dispatch(notification.id).await.unwrap();
    assert_eq!(other.outcome, DispatchOutcome::Skipped);
    assert!(!dispatcher.cancel(notification.id).await.unwrap());

    let handler = DispatchJobHandler::new(dispatcher.clone());
    handler.execute(&dispatch_job).await.unwrap();

    assert_eq!(harness.reload(&notification).await.status, NotificationStatus::Sent);
    let deliveries: Vec<Job> = harness
        .pending_jobs()
        .await
        .into_iter()
        .filter(|j| j.job_type == job_types::PUSH_DELIVERY)
        .collect();
    assert_eq!(deliveries.len(), 2);
}

#[tokio::test]
async fn test_sweep_continues_past_failed_notification() {
    let harness = flaky_harness(1);
    let dispatcher = dispatcher(&harness);
    let app_id = AppId::new();
    harness.device(app_id, Platform::Android, "fcm-1").await;
    let older = harness
        .notification_at(app_id, Some(Utc::now() - chrono::Duration::minutes(2)))
        .await;
    let newer = harness
        .notification_at(app_id, Some(Utc::now() - chrono::Duration::minutes(1)))
        .await;

    let summaries = dispatcher.sweep(Utc::now(), 10).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].notification_id, newer.id);
    assert_eq!(harness.reload(&newer).await.status, NotificationStatus::Sent);
    assert_eq!(harness.reload(&older).await.status, NotificationStatus::Scheduled);

    let summaries = dispatcher.sweep(Utc::now(), 10).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].notification_id, older.id);
    assert_eq!(summaries[0].outcome, DispatchOutcome::Dispatched);
    assert_eq!(harness.reload(&older).await.status, NotificationStatus::Sent);
}

#[tokio::test]
async fn test_reaper_recovers_dispatch_abandoned_by_dead_worker() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let app_id = AppId::new();
    let notification = harness.notification(app_id).await;
    harness.device(app_id, Platform::Android, "fcm-1").await;
    harness.device(app_id, Platform::Android, "fcm-2").await;
    dispatcher.submit(notification.id).await.unwrap();

    // The worker claims the job and the notification, then disappears.
    let running = harness.queue.dequeue().await.unwrap().unwrap();
    harness
        .stores
        .notifications
        .claim_for_dispatch(
            notification.id,
            &DispatchClaim::new(running.id.to_string(), chrono::Duration::minutes(5)),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(harness.pending_jobs().await.is_empty());
    tokio::time::sleep(Duration::from_millis(20)).await;

    let reaper = StaleJobReaper::new(harness.queue.clone(), chrono::Duration::milliseconds(10));
    let result = reaper.execute(&running).await.unwrap().unwrap();
    assert_eq!(result["requeued"], 1);
    assert_eq!(result["failed"], 0);
    let requeued = harness.queue.find(running.id).await.unwrap().unwrap();
    assert_eq!(requeued.status, JobStatus::Pending);

    let runner = WorkerRunner::new(
        harness.queue.clone(),
        executor(&harness, &dispatcher),
        worker_config(),
    );
    let report = runner.drain().await;
    assert_eq!(report.completed, 3);
    assert_eq!(harness.reload(&notification).await.status, NotificationStatus::Sent);
    assert_eq!(harness.counters(&notification).await, (2, 2, 0));
    assert_eq!(
        harness.queue.find(running.id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_two_devices_one_transient_failure_end_to_end() {
    let harness = Harness::new(Platform::Android);
    let dispatcher = dispatcher(&harness);
    let runner = WorkerRunner::new(
        harness.queue.clone(),
        executor(&harness, &dispatcher),
        worker_config(),
    );
    let app_id = AppId::new();
    let notification = harness.notification(app_id).await;
    let flaky = harness.device(app_id, Platform::Android, "fcm-flaky").await;
    let healthy = harness.device(app_id, Platform::Android, "fcm-healthy").await;
    harness
        .sender
        .push_for("fcm-flaky", Ok(SendResult::failure("HTTP 503", 503)))
        .await;

    dispatcher.submit(notification.id).await.unwrap();
    let report = runner.drain().await;
    assert_eq!(report.completed, 3);

    let stored = harness.reload(&notification).await;
    assert_eq!(stored.status, NotificationStatus::Sent);
    assert_eq!(stored.total_targets, 2);
    assert_eq!(harness.counters(&notification).await, (1, 1, 1));
    let log = |device_id| {
        let deliveries = harness.stores.deliveries.clone();
        async move {
            deliveries
                .find(notification.id, device_id)
                .await
                .unwrap()
                .unwrap()
        }
    };
    assert_eq!(log(flaky.id).await.status, DeliveryStatus::Failed);
    assert_eq!(log(healthy.id).await.status, DeliveryStatus::Sent);

    let pending = harness.pending_jobs().await;
    assert_eq!(pending.len(), 1);
    assert!(pending[0].scheduled_at > Utc::now());
    let retry: DeliveryJob = serde_json::from_value(pending[0].payload.clone()).unwrap();
    assert_eq!(retry.device_id, flaky.id);
    assert_eq!(retry.attempt_count, 1);

    harness.worker.process(&retry).await.unwrap();
    assert_eq!(harness.counters(&notification).await, (2, 2, 0));
    let recovered = log(flaky.id).await;
    assert_eq!(recovered.status, DeliveryStatus::Sent);
    assert_eq!(recovered.attempt_count, 1);
    assert_eq!(harness.sender.calls(), 3);
}
