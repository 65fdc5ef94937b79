//! Shared helpers for worker integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use pushhub_core::config::RetryConfig;
use pushhub_core::error::AppError;
use pushhub_core::result::AppResult;
use pushhub_core::types::{AppId, DeviceId, JobId};
use pushhub_database::MemoryStore;
use pushhub_database::store::{DeviceStore, JobStore, StaleJobs, Stores};
use pushhub_entity::device::{Device, Platform, RegisterDevice};
use pushhub_entity::job::{CreateJob, Job, JobStatus};
use pushhub_entity::notification::{CreateNotification, Notification, NotificationPayload};
use pushhub_provider::{ProviderError, PushMessage, PushSender, SendResult, SenderResolver};
use pushhub_worker::{DeliveryWorker, JobQueue, RetryPolicy};

pub const QUEUE: &str = "push";

type Answer = Result<SendResult, ProviderError>;

/// Sender that replays scripted answers, then accepts everything.
/// Answers scripted for a token are used before the shared script.
#[derive(Debug)]
pub struct ScriptedSender {
    platform: Platform,
    script: Mutex<VecDeque<Answer>>,
    by_token: Mutex<HashMap<String, VecDeque<Answer>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSender {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            script: Mutex::new(VecDeque::new()),
            by_token: Mutex::new(HashMap::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push(&self, answer: Answer) {
        self.script.lock().await.push_back(answer);
    }

    pub async fn push_for(&self, token: &str, answer: Answer) {
        self.by_token
            .lock()
            .await
            .entry(token.to_string())
            .or_default()
            .push_back(answer);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushSender for ScriptedSender {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn send(&self, message: &PushMessage) -> Result<SendResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = match self.by_token.lock().await.get_mut(&message.token) {
            Some(answers) => answers.pop_front(),
            None => None,
        };
        let scripted = match scripted {
            Some(answer) => Some(answer),
            None => self.script.lock().await.pop_front(),
        };
        match scripted {
            Some(answer) => answer,
            None => Ok(SendResult::success(
                Some(format!("msg-{}", message.device_id)),
                200,
            )),
        }
    }
}

/// Resolver handing out one sender for every app and platform.
#[derive(Debug)]
pub struct StaticResolver {
    pub sender: Arc<ScriptedSender>,
    pub public_key: Option<String>,
    pub resolve_error: Option<ProviderError>,
}

impl StaticResolver {
    pub fn new(sender: Arc<ScriptedSender>) -> Self {
        Self {
            sender,
            public_key: None,
            resolve_error: None,
        }
    }
}

#[async_trait]
impl SenderResolver for StaticResolver {
    async fn resolve(
        &self,
        _app_id: AppId,
        _platform: Platform,
    ) -> Result<Arc<dyn PushSender>, ProviderError> {
        if let Some(e) = &self.resolve_error {
            return Err(e.clone());
        }
        Ok(self.sender.clone())
    }

    async fn webpush_public_key(&self, _app_id: AppId) -> Result<Option<String>, ProviderError> {
        Ok(self.public_key.clone())
    }
}

/// Job store whose inserts always fail, as when the queue backend is down.
#[derive(Debug)]
pub struct UnavailableQueue(pub Arc<MemoryStore>);

#[async_trait]
impl JobStore for UnavailableQueue {
    async fn create(&self, _data: &CreateJob) -> AppResult<Job> {
        Err(AppError::database("queue connection refused"))
    }

    async fn find_by_id(&self, id: JobId) -> AppResult<Option<Job>> {
        JobStore::find_by_id(self.0.as_ref(), id).await
    }

    async fn claim_next(&self, queue: &str, worker_id: &str) -> AppResult<Option<Job>> {
        self.0.claim_next(queue, worker_id).await
    }

    async fn complete(&self, id: JobId, result: Option<&serde_json::Value>) -> AppResult<()> {
        self.0.complete(id, result).await
    }

    async fn fail(&self, id: JobId, error_message: &str) -> AppResult<()> {
        self.0.fail(id, error_message).await
    }

    async fn retry(&self, id: JobId, error_message: &str, run_at: DateTime<Utc>) -> AppResult<()> {
        self.0.retry(id, error_message, run_at).await
    }

    async fn cancel(&self, id: JobId) -> AppResult<bool> {
        JobStore::cancel(self.0.as_ref(), id).await
    }

    async fn list_by_status(&self, status: JobStatus, limit: i64) -> AppResult<Vec<Job>> {
        self.0.list_by_status(status, limit).await
    }

    async fn count_by_status(&self) -> AppResult<Vec<(JobStatus, i64)>> {
        self.0.count_by_status().await
    }

    async fn cleanup_old(&self, before: DateTime<Utc>) -> AppResult<u64> {
        self.0.cleanup_old(before).await
    }

    async fn requeue_stale(&self, started_before: DateTime<Utc>) -> AppResult<StaleJobs> {
        self.0.requeue_stale(started_before).await
    }
}

/// Device store whose first `failures` target lookups fail, as when the
/// database connection drops mid-dispatch.
#[derive(Debug)]
pub struct FlakyDevices {
    inner: Arc<MemoryStore>,
    failures: AtomicUsize,
}

impl FlakyDevices {
    pub fn new(inner: Arc<MemoryStore>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl DeviceStore for FlakyDevices {
    async fn register(&self, data: &RegisterDevice) -> AppResult<Device> {
        self.inner.register(data).await
    }

    async fn find_by_id(&self, id: DeviceId) -> AppResult<Option<Device>> {
        DeviceStore::find_by_id(self.inner.as_ref(), id).await
    }

    async fn find_deliverable(&self, app_id: AppId) -> AppResult<Vec<Device>> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::database("connection reset by peer"));
        }
        self.inner.find_deliverable(app_id).await
    }

    async fn mark_active(&self, id: DeviceId) -> AppResult<bool> {
        self.inner.mark_active(id).await
    }

    async fn expire(&self, id: DeviceId, reason: &str) -> AppResult<bool> {
        self.inner.expire(id, reason).await
    }

    async fn deactivate(&self, id: DeviceId, reason: &str) -> AppResult<bool> {
        self.inner.deactivate(id, reason).await
    }
}

/// Everything a delivery test needs, wired over one in-memory store.
pub struct Harness {
    pub stores: Stores,
    pub queue: Arc<JobQueue>,
    pub sender: Arc<ScriptedSender>,
    pub worker: Arc<DeliveryWorker>,
}

impl Harness {
    pub fn new(platform: Platform) -> Self {
        Self::build(platform, RetryConfig::default(), |resolver| resolver, None)
    }

    pub fn build(
        platform: Platform,
        retry: RetryConfig,
        customize: impl FnOnce(StaticResolver) -> StaticResolver,
        sender: Option<ScriptedSender>,
    ) -> Self {
        Self::with_stores(
            Stores::memory(),
            platform,
            retry,
            customize,
            sender,
            Duration::from_secs(5),
        )
    }

    pub fn with_stores(
        stores: Stores,
        platform: Platform,
        retry: RetryConfig,
        customize: impl FnOnce(StaticResolver) -> StaticResolver,
        sender: Option<ScriptedSender>,
        send_timeout: Duration,
    ) -> Self {
        let sender = Arc::new(sender.unwrap_or_else(|| ScriptedSender::new(platform)));
        let resolver = Arc::new(customize(StaticResolver::new(sender.clone())));
        let queue = Arc::new(JobQueue::new(stores.jobs.clone(), QUEUE, "test-worker"));
        let worker = Arc::new(DeliveryWorker::new(
            &stores,
            resolver,
            queue.clone(),
            RetryPolicy::new(&retry),
            send_timeout,
        ));
        Self {
            stores,
            queue,
            sender,
            worker,
        }
    }

    pub async fn notification(&self, app_id: AppId) -> Notification {
        self.notification_at(app_id, None).await
    }

    pub async fn notification_at(
        &self,
        app_id: AppId,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Notification {
        self.stores
            .notifications
            .create(&CreateNotification {
                app_id,
                payload: NotificationPayload::new("Sale", "Everything must go"),
                scheduled_at,
            })
            .await
            .unwrap()
    }

    pub async fn device(&self, app_id: AppId, platform: Platform, token: &str) -> Device {
        self.device_with_fingerprint(app_id, platform, token, None).await
    }

    pub async fn device_with_fingerprint(
        &self,
        app_id: AppId,
        platform: Platform,
        token: &str,
        fingerprint: Option<&str>,
    ) -> Device {
        let web = platform == Platform::Web;
        self.stores
            .devices
            .register(&RegisterDevice {
                app_id,
                platform,
                token: token.to_string(),
                p256dh: web.then(|| "BPublicKey".to_string()),
                auth_secret: web.then(|| "authsecret".to_string()),
                credential_fingerprint: fingerprint.map(str::to_string),
            })
            .await
            .unwrap()
    }

    pub async fn reload(&self, notification: &Notification) -> Notification {
        self.stores
            .notifications
            .find_by_id(notification.id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn reload_device(&self, device: &Device) -> Device {
        self.stores.devices.find_by_id(device.id).await.unwrap().unwrap()
    }

    /// (sent, delivered, failed) for a notification.
    pub async fn counters(&self, notification: &Notification) -> (i32, i32, i32) {
        let n = self.reload(notification).await;
        (n.total_sent, n.total_delivered, n.total_failed)
    }

    pub async fn pending_jobs(&self) -> Vec<Job> {
        self.queue.list(JobStatus::Pending, 100).await.unwrap()
    }
}
