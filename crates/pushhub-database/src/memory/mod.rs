//! In-process implementation of every store trait.
//!
//! All tables live behind one async mutex, so each trait call is atomic
//! with respect to every other call. Used by tests and by
//! `database.provider = "memory"`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::Mutex;

use pushhub_core::error::AppError;
use pushhub_core::result::AppResult;
use pushhub_core::types::{AppId, DeliveryLogId, DeviceId, JobId, NotificationId};
use pushhub_entity::app::PlatformCredential;
use pushhub_entity::delivery::{
    CounterDelta, DeliveryLog, DeliveryOutcome, DeliveryStatus, LedgerEntry, OutcomeKind,
    click_transition, transition,
};
use pushhub_entity::device::{Device, DeviceStatus, Platform, RegisterDevice};
use pushhub_entity::job::{CreateJob, Job, JobStatus};
use pushhub_entity::notification::{
    CreateNotification, DeliveryCounters, DispatchClaim, Notification, NotificationStatus,
};

use crate::store::{
    CredentialStore, DeliveryLogStore, DeviceStore, JobStore, LEASE_EXPIRED, NotificationStore,
    Reconciliation, StaleJobs,
};

#[derive(Debug, Default)]
struct State {
    notifications: HashMap<NotificationId, Notification>,
    devices: HashMap<DeviceId, Device>,
    logs: HashMap<(NotificationId, DeviceId), DeliveryLog>,
    jobs: HashMap<JobId, Job>,
    credentials: HashMap<(AppId, Platform), PlatformCredential>,
}

impl State {
    fn apply_delta(&mut self, notification_id: NotificationId, delta: CounterDelta) {
        if let Some(notification) = self.notifications.get_mut(&notification_id) {
            let mut counters = notification.counters();
            counters.apply(delta);
            notification.set_counters(counters);
            notification.updated_at = Utc::now();
        }
    }

    fn write_outcome(
        &mut self,
        notification_id: NotificationId,
        device_id: DeviceId,
        outcome: &DeliveryOutcome,
        keep_existing_failure: bool,
    ) -> Option<LedgerEntry> {
        let key = (notification_id, device_id);
        let previous = self.logs.get(&key).map(|log| log.status);
        if keep_existing_failure && previous == Some(DeliveryStatus::Failed) {
            return None;
        }

        let step = transition(previous, outcome.status());
        if step.write {
            let now = Utc::now();
            let sent_at = matches!(outcome.kind, OutcomeKind::Success).then_some(now);
            let log = self.logs.entry(key).or_insert_with(|| DeliveryLog {
                id: DeliveryLogId::new(),
                notification_id,
                device_id,
                status: step.status,
                error_message: None,
                provider_response: None,
                attempt_count: 0,
                status_code: None,
                sent_at: None,
                clicked_at: None,
                created_at: now,
                updated_at: now,
            });
            log.status = step.status;
            log.error_message = outcome.error.clone();
            log.provider_response = outcome.provider_response();
            log.attempt_count = outcome.attempt_count as i32;
            log.status_code = outcome.status_code.map(i32::from);
            log.sent_at = sent_at.or(log.sent_at);
            log.updated_at = now;
        }

        self.apply_delta(notification_id, step.delta);
        Some(LedgerEntry {
            previous,
            current: step.status,
            delta: step.delta,
        })
    }

    fn transition_device(&mut self, id: DeviceId, status: DeviceStatus, reason: &str) -> bool {
        match self.devices.get_mut(&id) {
            Some(device) if device.status.is_deliverable() => {
                device.status = status;
                device.last_error = Some(reason.to_string());
                device.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

/// Shared in-memory tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, data: &CreateNotification) -> AppResult<Notification> {
        let now = Utc::now();
        let notification = Notification {
            id: NotificationId::new(),
            app_id: data.app_id,
            payload: Json(data.payload.clone()),
            status: data.initial_status(),
            scheduled_at: data.scheduled_at,
            dispatch_started_at: None,
            dispatch_claim: None,
            sent_at: None,
            failure_reason: None,
            total_targets: 0,
            total_sent: 0,
            total_delivered: 0,
            total_failed: 0,
            total_clicked: 0,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().await;
        state.notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn find_by_id(&self, id: NotificationId) -> AppResult<Option<Notification>> {
        Ok(self.state.lock().await.notifications.get(&id).cloned())
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let state = self.state.lock().await;
        let mut due: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| n.is_due(now, stale_before))
            .cloned()
            .collect();
        due.sort_by_key(|n| n.scheduled_at.unwrap_or(n.created_at));
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn claim_for_dispatch(
        &self,
        id: NotificationId,
        claim: &DispatchClaim,
    ) -> AppResult<Option<Notification>> {
        let mut state = self.state.lock().await;
        match state.notifications.get_mut(&id) {
            Some(notification) if notification.is_claimable(claim) => {
                notification.dispatch_started_at = Some(claim.at);
                notification.dispatch_claim = Some(claim.token.clone());
                notification.updated_at = Utc::now();
                Ok(Some(notification.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release_claim(&self, id: NotificationId, token: &str) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.notifications.get_mut(&id) {
            Some(notification)
                if notification.status.is_dispatchable()
                    && notification.dispatch_claim.as_deref() == Some(token) =>
            {
                notification.dispatch_started_at = None;
                notification.dispatch_claim = None;
                notification.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_total_targets(&self, id: NotificationId, total: i32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(notification) = state.notifications.get_mut(&id) {
            notification.total_targets = total;
            notification.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_sent(&self, id: NotificationId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(notification) = state.notifications.get_mut(&id)
            && notification.status.is_dispatchable()
        {
            let now = Utc::now();
            notification.status = NotificationStatus::Sent;
            notification.sent_at = Some(now);
            notification.updated_at = now;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: NotificationId, reason: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(notification) = state.notifications.get_mut(&id)
            && notification.status.is_dispatchable()
        {
            notification.status = NotificationStatus::Failed;
            notification.failure_reason = Some(reason.to_string());
            notification.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn cancel(&self, id: NotificationId) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.notifications.get_mut(&id) {
            Some(notification)
                if notification.status.is_dispatchable()
                    && notification.dispatch_started_at.is_none() =>
            {
                notification.status = NotificationStatus::Cancelled;
                notification.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn register(&self, data: &RegisterDevice) -> AppResult<Device> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let existing = state.devices.values_mut().find(|d| {
            d.app_id == data.app_id && d.platform == data.platform && d.token == data.token
        });
        if let Some(device) = existing {
            device.p256dh = data.p256dh.clone();
            device.auth_secret = data.auth_secret.clone();
            device.credential_fingerprint = data.credential_fingerprint.clone();
            device.status = DeviceStatus::Pending;
            device.last_error = None;
            device.updated_at = now;
            return Ok(device.clone());
        }

        let device = Device {
            id: DeviceId::new(),
            app_id: data.app_id,
            platform: data.platform,
            token: data.token.clone(),
            p256dh: data.p256dh.clone(),
            auth_secret: data.auth_secret.clone(),
            status: DeviceStatus::Pending,
            credential_fingerprint: data.credential_fingerprint.clone(),
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        state.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn find_by_id(&self, id: DeviceId) -> AppResult<Option<Device>> {
        Ok(self.state.lock().await.devices.get(&id).cloned())
    }

    async fn find_deliverable(&self, app_id: AppId) -> AppResult<Vec<Device>> {
        let state = self.state.lock().await;
        let mut devices: Vec<Device> = state
            .devices
            .values()
            .filter(|d| d.app_id == app_id && d.is_deliverable())
            .cloned()
            .collect();
        devices.sort_by_key(|d| d.created_at);
        Ok(devices)
    }

    async fn mark_active(&self, id: DeviceId) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.devices.get_mut(&id) {
            Some(device) if device.status == DeviceStatus::Pending => {
                device.status = DeviceStatus::Active;
                device.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire(&self, id: DeviceId, reason: &str) -> AppResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .transition_device(id, DeviceStatus::Expired, reason))
    }

    async fn deactivate(&self, id: DeviceId, reason: &str) -> AppResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .transition_device(id, DeviceStatus::Inactive, reason))
    }
}

#[async_trait]
impl DeliveryLogStore for MemoryStore {
    async fn record(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        outcome: &DeliveryOutcome,
    ) -> AppResult<LedgerEntry> {
        let mut state = self.state.lock().await;
        state
            .write_outcome(notification_id, device_id, outcome, false)
            .ok_or_else(|| AppError::internal("Ledger write skipped unexpectedly"))
    }

    async fn record_failure_once(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        outcome: &DeliveryOutcome,
    ) -> AppResult<Option<LedgerEntry>> {
        let mut state = self.state.lock().await;
        Ok(state.write_outcome(notification_id, device_id, outcome, true))
    }

    async fn record_click(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let key = (notification_id, device_id);
        let previous = state.logs.get(&key).map(|log| log.status);
        let Some(delta) = click_transition(previous) else {
            return Ok(false);
        };
        if let Some(log) = state.logs.get_mut(&key) {
            log.status = DeliveryStatus::Clicked;
            log.clicked_at = Some(at);
            log.updated_at = Utc::now();
        }
        state.apply_delta(notification_id, delta);
        Ok(true)
    }

    async fn find(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
    ) -> AppResult<Option<DeliveryLog>> {
        Ok(self
            .state
            .lock()
            .await
            .logs
            .get(&(notification_id, device_id))
            .cloned())
    }

    async fn list_for_notification(
        &self,
        notification_id: NotificationId,
    ) -> AppResult<Vec<DeliveryLog>> {
        let state = self.state.lock().await;
        let mut logs: Vec<DeliveryLog> = state
            .logs
            .values()
            .filter(|log| log.notification_id == notification_id)
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.created_at);
        Ok(logs)
    }

    async fn reconcile(&self, notification_id: NotificationId) -> AppResult<Reconciliation> {
        let mut state = self.state.lock().await;
        let after = DeliveryCounters::fold(
            state
                .logs
                .values()
                .filter(|log| log.notification_id == notification_id)
                .map(|log| log.status),
        );
        let notification = state
            .notifications
            .get_mut(&notification_id)
            .ok_or_else(|| AppError::not_found(format!("Notification {notification_id} not found")))?;
        let before = notification.counters();
        notification.set_counters(after);
        notification.updated_at = Utc::now();
        Ok(Reconciliation { before, after })
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, data: &CreateJob) -> AppResult<Job> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        if let Some(key) = &data.dedupe_key
            && let Some(existing) = state
                .jobs
                .values()
                .find(|j| j.dedupe_key.as_ref() == Some(key))
        {
            return Ok(existing.clone());
        }

        let job = Job {
            id: JobId::new(),
            job_type: data.job_type.clone(),
            queue: data.queue.clone(),
            priority: data.priority,
            payload: data.payload.clone(),
            result: None,
            error_message: None,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: data.max_attempts,
            scheduled_at: data.scheduled_at.unwrap_or(now),
            started_at: None,
            completed_at: None,
            worker_id: None,
            dedupe_key: data.dedupe_key.clone(),
            created_at: now,
            updated_at: now,
        };
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: JobId) -> AppResult<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn claim_next(&self, queue: &str, worker_id: &str) -> AppResult<Option<Job>> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let next = state
            .jobs
            .values()
            .filter(|j| j.queue == queue && j.status == JobStatus::Pending && j.scheduled_at <= now)
            .min_by_key(|j| {
                (
                    std::cmp::Reverse(j.priority.numeric_priority()),
                    j.scheduled_at,
                    j.created_at,
                )
            })
            .map(|j| j.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::internal("Claimed job vanished"))?;
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.worker_id = Some(worker_id.to_string());
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: JobId, result: Option<&serde_json::Value>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            let now = Utc::now();
            job.status = JobStatus::Completed;
            job.result = result.cloned();
            job.completed_at = Some(now);
            job.updated_at = now;
        }
        Ok(())
    }

    async fn fail(&self, id: JobId, error_message: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            let now = Utc::now();
            job.status = JobStatus::Failed;
            job.error_message = Some(error_message.to_string());
            job.completed_at = Some(now);
            job.updated_at = now;
        }
        Ok(())
    }

    async fn retry(&self, id: JobId, error_message: &str, run_at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id)
            && job.status == JobStatus::Running
        {
            job.status = JobStatus::Pending;
            job.error_message = Some(error_message.to_string());
            job.scheduled_at = run_at;
            job.started_at = None;
            job.worker_id = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn cancel(&self, id: JobId) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_status(&self, status: JobStatus, limit: i64) -> AppResult<Vec<Job>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| std::cmp::Reverse(j.updated_at));
        jobs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(jobs)
    }

    async fn count_by_status(&self) -> AppResult<Vec<(JobStatus, i64)>> {
        let state = self.state.lock().await;
        let mut counts: HashMap<JobStatus, i64> = HashMap::new();
        for job in state.jobs.values() {
            *counts.entry(job.status).or_default() += 1;
        }
        let mut counts: Vec<(JobStatus, i64)> = counts.into_iter().collect();
        counts.sort_by_key(|(status, _)| status.as_str());
        Ok(counts)
    }

    async fn cleanup_old(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let initial = state.jobs.len();
        state
            .jobs
            .retain(|_, j| !(j.status.is_terminal() && j.updated_at < before));
        Ok((initial - state.jobs.len()) as u64)
    }

    async fn requeue_stale(&self, started_before: DateTime<Utc>) -> AppResult<StaleJobs> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let mut reaped = StaleJobs::default();
        let stale = state.jobs.values_mut().filter(|j| {
            j.status == JobStatus::Running && j.started_at.is_some_and(|at| at < started_before)
        });
        for job in stale {
            job.error_message = Some(LEASE_EXPIRED.to_string());
            job.updated_at = now;
            if job.attempts <= job.max_attempts {
                job.status = JobStatus::Pending;
                job.scheduled_at = now;
                job.started_at = None;
                job.worker_id = None;
                reaped.requeued += 1;
            } else {
                job.status = JobStatus::Failed;
                job.completed_at = Some(now);
                reaped.failed += 1;
            }
        }
        Ok(reaped)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find(
        &self,
        app_id: AppId,
        platform: Platform,
    ) -> AppResult<Option<PlatformCredential>> {
        Ok(self
            .state
            .lock()
            .await
            .credentials
            .get(&(app_id, platform))
            .cloned())
    }

    async fn upsert(
        &self,
        app_id: AppId,
        platform: Platform,
        payload: &str,
    ) -> AppResult<PlatformCredential> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let credential = state
            .credentials
            .entry((app_id, platform))
            .and_modify(|c| {
                c.payload = payload.to_string();
                c.updated_at = now;
            })
            .or_insert_with(|| PlatformCredential {
                app_id,
                platform,
                payload: payload.to_string(),
                created_at: now,
                updated_at: now,
            });
        Ok(credential.clone())
    }
}

#[cfg(test)]
mod tests;
