//! Store traits consumed by the worker, dispatcher, and registry.
//!
//! Every state change that other writers may race on is a single atomic
//! store call: device transitions are conditional updates, ledger writes
//! serialize on the (notification, device) pair, and dispatch claims are
//! compare-and-swap. Callers never read-modify-write counters themselves.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use pushhub_core::config::DatabaseConfig;
use pushhub_core::error::AppError;
use pushhub_core::result::AppResult;
use pushhub_core::types::{AppId, DeviceId, JobId, NotificationId};
use pushhub_entity::app::PlatformCredential;
use pushhub_entity::delivery::{DeliveryLog, DeliveryOutcome, LedgerEntry};
use pushhub_entity::device::{Device, Platform, RegisterDevice};
use pushhub_entity::job::{CreateJob, Job, JobStatus};
use pushhub_entity::notification::{
    CreateNotification, DeliveryCounters, DispatchClaim, Notification,
};

use crate::connection::DatabasePool;
use crate::memory::MemoryStore;
use crate::repositories::{
    CredentialRepository, DeliveryLogRepository, DeviceRepository, JobRepository,
    NotificationRepository,
};

/// Notification rows. Counters are written only through [`DeliveryLogStore`].
#[async_trait]
pub trait NotificationStore: Send + Sync + fmt::Debug + 'static {
    /// Insert a notification; status follows the schedule.
    async fn create(&self, data: &CreateNotification) -> AppResult<Notification>;

    /// Find a notification by ID.
    async fn find_by_id(&self, id: NotificationId) -> AppResult<Option<Notification>>;

    /// Pending or scheduled notifications due at `now` that are unclaimed
    /// or whose claim started before `stale_before`.
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Notification>>;

    /// Take a dispatch claim. Succeeds when the notification is due and
    /// unclaimed, already held by `claim.token`, or held by an abandoned
    /// claim. Returns the row only to the caller that now holds the claim.
    async fn claim_for_dispatch(
        &self,
        id: NotificationId,
        claim: &DispatchClaim,
    ) -> AppResult<Option<Notification>>;

    /// Drop a claim still held by `token` on an undispatched notification,
    /// making it due again. Returns whether the claim was released.
    async fn release_claim(&self, id: NotificationId, token: &str) -> AppResult<bool>;

    /// Record how many devices the dispatcher resolved.
    async fn set_total_targets(&self, id: NotificationId, total: i32) -> AppResult<()>;

    /// Fan-out finished.
    async fn mark_sent(&self, id: NotificationId) -> AppResult<()>;

    /// Dispatch could not start.
    async fn mark_failed(&self, id: NotificationId, reason: &str) -> AppResult<()>;

    /// Cancel a notification that has not been claimed. Returns whether it
    /// was cancelled.
    async fn cancel(&self, id: NotificationId) -> AppResult<bool>;
}

/// Device rows.
#[async_trait]
pub trait DeviceStore: Send + Sync + fmt::Debug + 'static {
    /// Register or re-register a device. Re-registration resets the status
    /// to pending and replaces keys and fingerprint.
    async fn register(&self, data: &RegisterDevice) -> AppResult<Device>;

    /// Find a device by ID.
    async fn find_by_id(&self, id: DeviceId) -> AppResult<Option<Device>>;

    /// Pending and active devices of an app.
    async fn find_deliverable(&self, app_id: AppId) -> AppResult<Vec<Device>>;

    /// Promote a pending device to active. Returns whether this call did it.
    async fn mark_active(&self, id: DeviceId) -> AppResult<bool>;

    /// Move a deliverable device to expired. Returns whether this call did it.
    async fn expire(&self, id: DeviceId, reason: &str) -> AppResult<bool>;

    /// Move a deliverable device to inactive. Returns whether this call did it.
    async fn deactivate(&self, id: DeviceId, reason: &str) -> AppResult<bool>;
}

/// Before/after counters of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Counters stored before the call.
    pub before: DeliveryCounters,
    /// Counters recomputed from the delivery log.
    pub after: DeliveryCounters,
}

impl Reconciliation {
    /// Whether stored counters had drifted.
    pub fn drifted(&self) -> bool {
        self.before != self.after
    }
}

/// Delivery log rows and the notification counters derived from them.
#[async_trait]
pub trait DeliveryLogStore: Send + Sync + fmt::Debug + 'static {
    /// Record an attempt outcome: read the previous status, upsert the row,
    /// and apply the counter transition, atomically for the pair.
    async fn record(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        outcome: &DeliveryOutcome,
    ) -> AppResult<LedgerEntry>;

    /// Record a failure unless the pair is already failed. Returns `None`
    /// when nothing was written.
    async fn record_failure_once(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        outcome: &DeliveryOutcome,
    ) -> AppResult<Option<LedgerEntry>>;

    /// Overlay a click. Returns whether anything changed.
    async fn record_click(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Current row for a pair.
    async fn find(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
    ) -> AppResult<Option<DeliveryLog>>;

    /// Every row of a notification.
    async fn list_for_notification(
        &self,
        notification_id: NotificationId,
    ) -> AppResult<Vec<DeliveryLog>>;

    /// Recompute counters from the current rows and store them.
    async fn reconcile(&self, notification_id: NotificationId) -> AppResult<Reconciliation>;
}

/// Durable job queue.
#[async_trait]
pub trait JobStore: Send + Sync + fmt::Debug + 'static {
    /// Insert a job. When `data.dedupe_key` matches an existing job, that
    /// job is returned and nothing is inserted.
    async fn create(&self, data: &CreateJob) -> AppResult<Job>;

    /// Find a job by ID.
    async fn find_by_id(&self, id: JobId) -> AppResult<Option<Job>>;

    /// Claim the next runnable job of a queue for `worker_id`.
    async fn claim_next(&self, queue: &str, worker_id: &str) -> AppResult<Option<Job>>;

    /// Mark a job as completed.
    async fn complete(&self, id: JobId, result: Option<&serde_json::Value>) -> AppResult<()>;

    /// Mark a job as failed.
    async fn fail(&self, id: JobId, error_message: &str) -> AppResult<()>;

    /// Return a running job to pending, runnable from `run_at`.
    async fn retry(&self, id: JobId, error_message: &str, run_at: DateTime<Utc>) -> AppResult<()>;

    /// Cancel a pending job. Returns whether it was cancelled.
    async fn cancel(&self, id: JobId) -> AppResult<bool>;

    /// Most recent jobs with a given status.
    async fn list_by_status(&self, status: JobStatus, limit: i64) -> AppResult<Vec<Job>>;

    /// Job counts per status.
    async fn count_by_status(&self) -> AppResult<Vec<(JobStatus, i64)>>;

    /// Delete finished jobs last updated before `before`.
    async fn cleanup_old(&self, before: DateTime<Utc>) -> AppResult<u64>;

    /// Settle running jobs started before `started_before`: back to pending
    /// while attempts remain, failed otherwise.
    async fn requeue_stale(&self, started_before: DateTime<Utc>) -> AppResult<StaleJobs>;
}

/// Jobs settled by [`JobStore::requeue_stale`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleJobs {
    /// Returned to pending.
    pub requeued: u64,
    /// Out of attempts, marked failed.
    pub failed: u64,
}

/// Error recorded on jobs whose worker lease expired.
pub const LEASE_EXPIRED: &str = "Worker lease expired";

/// Per-app provider credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync + fmt::Debug + 'static {
    /// Stored credentials for a platform.
    async fn find(&self, app_id: AppId, platform: Platform)
    -> AppResult<Option<PlatformCredential>>;

    /// Insert or rotate credentials.
    async fn upsert(
        &self,
        app_id: AppId,
        platform: Platform,
        payload: &str,
    ) -> AppResult<PlatformCredential>;
}

/// Every store, shared by `Arc` across the process.
#[derive(Debug, Clone)]
pub struct Stores {
    /// Notification rows.
    pub notifications: Arc<dyn NotificationStore>,
    /// Device rows.
    pub devices: Arc<dyn DeviceStore>,
    /// Delivery ledger.
    pub deliveries: Arc<dyn DeliveryLogStore>,
    /// Job queue.
    pub jobs: Arc<dyn JobStore>,
    /// Provider credentials.
    pub credentials: Arc<dyn CredentialStore>,
}

impl Stores {
    /// Build the stores selected by `database.provider`.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        match config.provider.as_str() {
            "memory" => {
                info!("Using in-memory stores");
                Ok(Self::memory())
            }
            "postgres" | "postgresql" => {
                let pool = DatabasePool::connect(config).await?;
                Ok(Self::postgres(&pool))
            }
            other => Err(AppError::configuration(format!(
                "Unknown database provider: '{other}'. Use 'postgres' or 'memory'."
            ))),
        }
    }

    /// Stores backed by one shared in-memory state.
    pub fn memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    /// Stores backed by an existing in-memory state.
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            notifications: store.clone(),
            devices: store.clone(),
            deliveries: store.clone(),
            jobs: store.clone(),
            credentials: store,
        }
    }

    /// Stores backed by PostgreSQL.
    pub fn postgres(pool: &DatabasePool) -> Self {
        let pool = pool.pool().clone();
        Self {
            notifications: Arc::new(NotificationRepository::new(pool.clone())),
            devices: Arc::new(DeviceRepository::new(pool.clone())),
            deliveries: Arc::new(DeliveryLogRepository::new(pool.clone())),
            jobs: Arc::new(JobRepository::new(pool.clone())),
            credentials: Arc::new(CredentialRepository::new(pool)),
        }
    }
}
