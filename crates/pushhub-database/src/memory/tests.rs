use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;

use pushhub_core::types::AppId;
use pushhub_entity::delivery::{DeliveryOutcome, DeliveryStatus};
use pushhub_entity::device::{Device, DeviceStatus, Platform, RegisterDevice};
use pushhub_entity::job::{CreateJob, JobPriority, JobStatus};
use pushhub_entity::notification::{
    CreateNotification, DispatchClaim, Notification, NotificationPayload, NotificationStatus,
};

use super::MemoryStore;
use crate::store::{
    DeliveryLogStore, DeviceStore, JobStore, LEASE_EXPIRED, NotificationStore, StaleJobs,
};

async fn seed(store: &MemoryStore) -> (Notification, Device) {
    let app_id = AppId::new();
    let notification = NotificationStore::create(
        store,
        &CreateNotification {
            app_id,
            payload: NotificationPayload::new("Hello", "World"),
            scheduled_at: None,
        },
    )
    .await
    .unwrap();
    let device = store
        .register(&RegisterDevice {
            app_id,
            platform: Platform::Android,
            token: "fcm-token".to_string(),
            p256dh: None,
            auth_secret: None,
            credential_fingerprint: None,
        })
        .await
        .unwrap();
    (notification, device)
}

fn delivery_job(queue: &str, priority: JobPriority) -> CreateJob {
    CreateJob {
        job_type: "push_delivery".to_string(),
        queue: queue.to_string(),
        priority,
        payload: serde_json::json!({}),
        max_attempts: 1,
        scheduled_at: None,
        dedupe_key: None,
    }
}

fn claim(token: &str) -> DispatchClaim {
    DispatchClaim::new(token, Duration::minutes(5))
}

#[tokio::test]
async fn test_concurrent_success_for_same_pair_counts_once() {
    let store = Arc::new(MemoryStore::new());
    let (notification, device) = seed(&store).await;
    let (notification_id, device_id) = (notification.id, device.id);

    let writes = (0..8).map(|_| {
        let store = store.clone();
        async move {
            store
                .record(
                    notification_id,
                    device_id,
                    &DeliveryOutcome::success(Some("m-1".to_string()), Some(200), 0),
                )
                .await
        }
    });
    for result in join_all(writes).await {
        result.unwrap();
    }

    let stored = NotificationStore::find_by_id(store.as_ref(), notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_sent, 1);
    assert_eq!(stored.total_delivered, 1);
    assert_eq!(stored.total_failed, 0);
}

#[tokio::test]
async fn test_retry_success_moves_failure_across() {
    let store = MemoryStore::new();
    let (notification, device) = seed(&store).await;

    store
        .record(notification.id, device.id, &DeliveryOutcome::failure("HTTP 503", Some(503), 0))
        .await
        .unwrap();
    let entry = store
        .record(notification.id, device.id, &DeliveryOutcome::success(None, Some(200), 1))
        .await
        .unwrap();
    assert_eq!(entry.previous, Some(DeliveryStatus::Failed));
    assert_eq!(entry.current, DeliveryStatus::Sent);

    let stored = NotificationStore::find_by_id(&store, notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((stored.total_sent, stored.total_failed), (1, 0));

    let log = store.find(notification.id, device.id).await.unwrap().unwrap();
    assert_eq!(log.attempt_count, 1);
    assert_eq!(log.status_code, Some(200));
}

#[tokio::test]
async fn test_record_failure_once_skips_failed_pair() {
    let store = MemoryStore::new();
    let (notification, device) = seed(&store).await;
    let outcome = DeliveryOutcome::failure("boom", None, 0);

    assert!(store
        .record_failure_once(notification.id, device.id, &outcome)
        .await
        .unwrap()
        .is_some());
    assert!(store
        .record_failure_once(notification.id, device.id, &outcome)
        .await
        .unwrap()
        .is_none());

    let stored = NotificationStore::find_by_id(&store, notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_failed, 1);
}

#[tokio::test]
async fn test_click_is_counted_once_and_never_overwritten() {
    let store = MemoryStore::new();
    let (notification, device) = seed(&store).await;
    store
        .record(notification.id, device.id, &DeliveryOutcome::success(None, Some(201), 0))
        .await
        .unwrap();

    assert!(store.record_click(notification.id, device.id, Utc::now()).await.unwrap());
    assert!(!store.record_click(notification.id, device.id, Utc::now()).await.unwrap());

    store
        .record(notification.id, device.id, &DeliveryOutcome::failure("late", Some(500), 1))
        .await
        .unwrap();
    let log = store.find(notification.id, device.id).await.unwrap().unwrap();
    assert_eq!(log.status, DeliveryStatus::Clicked);

    let stored = NotificationStore::find_by_id(&store, notification.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_clicked, 1);
    assert_eq!(stored.total_failed, 0);
}

#[tokio::test]
async fn test_reconcile_repairs_drift() {
    let store = MemoryStore::new();
    let (notification, device) = seed(&store).await;
    store
        .record(notification.id, device.id, &DeliveryOutcome::success(None, None, 0))
        .await
        .unwrap();

    store
        .state
        .lock()
        .await
        .notifications
        .get_mut(&notification.id)
        .unwrap()
        .total_sent = 7;

    let result = store.reconcile(notification.id).await.unwrap();
    assert!(result.drifted());
    assert_eq!(result.before.total_sent, 7);
    assert_eq!(result.after.total_sent, 1);
    assert!(!store.reconcile(notification.id).await.unwrap().drifted());
}

#[tokio::test]
async fn test_concurrent_expire_transitions_once() {
    let store = Arc::new(MemoryStore::new());
    let (_, device) = seed(&store).await;
    let device_id = device.id;

    let attempts = (0..5).map(|_| {
        let store = store.clone();
        async move { store.expire(device_id, "HTTP 410").await }
    });
    let transitioned = join_all(attempts)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(true)))
        .count();
    assert_eq!(transitioned, 1);

    let stored = DeviceStore::find_by_id(store.as_ref(), device.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DeviceStatus::Expired);
    assert!(!store.deactivate(device.id, "late").await.unwrap());
}

#[tokio::test]
async fn test_register_again_resets_to_pending() {
    let store = MemoryStore::new();
    let (_, device) = seed(&store).await;
    store.deactivate(device.id, "VAPID mismatch").await.unwrap();

    let again = store
        .register(&RegisterDevice {
            app_id: device.app_id,
            platform: device.platform,
            token: device.token.clone(),
            p256dh: None,
            auth_secret: None,
            credential_fingerprint: Some("new-key".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(again.id, device.id);
    assert_eq!(again.status, DeviceStatus::Pending);
    assert!(store.mark_active(device.id).await.unwrap());
    assert!(!store.mark_active(device.id).await.unwrap());
}

#[tokio::test]
async fn test_dispatch_claim_and_cancel_are_exclusive() {
    let store = MemoryStore::new();
    let (notification, _) = seed(&store).await;

    assert!(store.claim_for_dispatch(notification.id, &claim("a")).await.unwrap().is_some());
    assert!(store.claim_for_dispatch(notification.id, &claim("b")).await.unwrap().is_none());
    assert!(!NotificationStore::cancel(&store, notification.id).await.unwrap());

    let (other, _) = seed(&store).await;
    assert!(NotificationStore::cancel(&store, other.id).await.unwrap());
    let cancelled = NotificationStore::find_by_id(&store, other.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, NotificationStatus::Cancelled);
    assert!(store.claim_for_dispatch(other.id, &claim("a")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_holder_can_resume_and_release() {
    let store = MemoryStore::new();
    let (notification, _) = seed(&store).await;
    let now = Utc::now();

    let held = store
        .claim_for_dispatch(notification.id, &claim("job-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(held.dispatch_claim.as_deref(), Some("job-1"));
    assert!(store.find_due(now, now - Duration::minutes(5), 10).await.unwrap().is_empty());
    assert!(store.claim_for_dispatch(notification.id, &claim("job-1")).await.unwrap().is_some());

    assert!(!store.release_claim(notification.id, "job-2").await.unwrap());
    assert!(store.release_claim(notification.id, "job-1").await.unwrap());
    let released = NotificationStore::find_by_id(&store, notification.id)
        .await
        .unwrap()
        .unwrap();
    assert!(released.dispatch_started_at.is_none());
    assert_eq!(store.find_due(now, now, 10).await.unwrap().len(), 1);
    assert!(store.claim_for_dispatch(notification.id, &claim("job-2")).await.unwrap().is_some());

    store.mark_sent(notification.id).await.unwrap();
    assert!(!store.release_claim(notification.id, "job-2").await.unwrap());
}

#[tokio::test]
async fn test_abandoned_claim_is_swept_again() {
    let store = MemoryStore::new();
    let (notification, _) = seed(&store).await;
    let old = DispatchClaim {
        token: "crashed".to_string(),
        at: Utc::now() - Duration::minutes(10),
        stale_before: Utc::now() - Duration::minutes(15),
    };
    assert!(store.claim_for_dispatch(notification.id, &old).await.unwrap().is_some());

    let fresh = claim("sweep");
    let due = store.find_due(fresh.at, fresh.stale_before, 10).await.unwrap();
    assert_eq!(due.len(), 1);
    let taken = store
        .claim_for_dispatch(notification.id, &fresh)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(taken.dispatch_claim.as_deref(), Some("sweep"));
}

#[tokio::test]
async fn test_scheduled_notification_is_not_due_early() {
    let store = MemoryStore::new();
    let later = NotificationStore::create(
        &store,
        &CreateNotification {
            app_id: AppId::new(),
            payload: NotificationPayload::new("Later", "Soon"),
            scheduled_at: Some(Utc::now() + Duration::hours(1)),
        },
    )
    .await
    .unwrap();
    assert_eq!(later.status, NotificationStatus::Scheduled);
    let now = Utc::now();
    assert!(store.find_due(now, now, 10).await.unwrap().is_empty());
    let later_on = now + Duration::hours(2);
    assert_eq!(store.find_due(later_on, now, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_dedupe_key_returns_existing_job() {
    let store = MemoryStore::new();
    let mut data = delivery_job("push", JobPriority::Normal);
    data.dedupe_key = Some("push_delivery:n:d:0".to_string());

    let first = JobStore::create(&store, &data).await.unwrap();
    let second = JobStore::create(&store, &data).await.unwrap();
    assert_eq!(first.id, second.id);

    data.dedupe_key = None;
    let third = JobStore::create(&store, &data).await.unwrap();
    let fourth = JobStore::create(&store, &data).await.unwrap();
    assert_ne!(third.id, fourth.id);
    assert_eq!(store.list_by_status(JobStatus::Pending, 10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_requeue_stale_returns_abandoned_jobs() {
    let store = MemoryStore::new();
    let job = JobStore::create(&store, &delivery_job("push", JobPriority::Normal))
        .await
        .unwrap();
    store.claim_next("push", "w1").await.unwrap().unwrap();

    let none = store
        .requeue_stale(Utc::now() - Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(none, StaleJobs::default());

    let reaped = store
        .requeue_stale(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(reaped.requeued, 1);
    let requeued = JobStore::find_by_id(&store, job.id).await.unwrap().unwrap();
    assert_eq!(requeued.status, JobStatus::Pending);
    assert!(requeued.worker_id.is_none());
    assert_eq!(requeued.error_message.as_deref(), Some(LEASE_EXPIRED));

    let again = store.claim_next("push", "w2").await.unwrap().unwrap();
    assert_eq!(again.id, job.id);
    assert_eq!(again.attempts, 2);
    let reaped = store
        .requeue_stale(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(reaped, StaleJobs { requeued: 0, failed: 1 });
    let failed = JobStore::find_by_id(&store, job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_claim_next_respects_priority_and_schedule() {
    let store = MemoryStore::new();
    let low = JobStore::create(&store, &delivery_job("push", JobPriority::Low))
        .await
        .unwrap();
    let high = JobStore::create(&store, &delivery_job("push", JobPriority::High))
        .await
        .unwrap();
    let mut delayed = delivery_job("push", JobPriority::Critical);
    delayed.scheduled_at = Some(Utc::now() + Duration::minutes(5));
    JobStore::create(&store, &delayed).await.unwrap();
    JobStore::create(&store, &delivery_job("other", JobPriority::Critical))
        .await
        .unwrap();

    let first = store.claim_next("push", "w1").await.unwrap().unwrap();
    assert_eq!(first.id, high.id);
    assert_eq!(first.status, JobStatus::Running);
    assert_eq!(first.attempts, 1);

    let second = store.claim_next("push", "w1").await.unwrap().unwrap();
    assert_eq!(second.id, low.id);
    assert!(store.claim_next("push", "w1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_cleanup_only_removes_finished_jobs() {
    let store = MemoryStore::new();
    let done = JobStore::create(&store, &delivery_job("push", JobPriority::Normal))
        .await
        .unwrap();
    JobStore::create(&store, &delivery_job("push", JobPriority::Normal))
        .await
        .unwrap();
    store.complete(done.id, None).await.unwrap();

    let removed = store.cleanup_old(Utc::now() + Duration::seconds(1)).await.unwrap();
    assert_eq!(removed, 1);
    let counts = store.count_by_status().await.unwrap();
    assert_eq!(counts, vec![(JobStatus::Pending, 1)]);
}
