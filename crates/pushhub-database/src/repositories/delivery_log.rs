//! Delivery ledger repository implementation.
//!
//! Each ledger write runs in one transaction that first takes a
//! transaction-scoped advisory lock on the (notification, device) pair,
//! so the previous-status read and the write cannot interleave with a
//! concurrent attempt for the same pair.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use pushhub_core::error::{AppError, ErrorKind};
use pushhub_core::result::AppResult;
use pushhub_core::types::{DeliveryLogId, DeviceId, NotificationId};
use pushhub_entity::delivery::{
    CounterDelta, DeliveryLog, DeliveryOutcome, DeliveryStatus, LedgerEntry, OutcomeKind,
    click_transition, transition,
};
use pushhub_entity::notification::DeliveryCounters;

use crate::store::{DeliveryLogStore, Reconciliation};

/// Repository for delivery log rows and notification counters.
#[derive(Debug, Clone)]
pub struct DeliveryLogRepository {
    pool: PgPool,
}

fn db_err(message: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, message, e)
}

impl DeliveryLogRepository {
    /// Create a new delivery log repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_for_pair(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
    ) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin ledger transaction"))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text || ':' || $2::text, 0))")
            .bind(notification_id)
            .bind(device_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to lock delivery pair"))?;

        Ok(tx)
    }

    async fn previous_status(
        tx: &mut Transaction<'static, Postgres>,
        notification_id: NotificationId,
        device_id: DeviceId,
    ) -> AppResult<Option<DeliveryStatus>> {
        sqlx::query_scalar::<_, DeliveryStatus>(
            "SELECT status FROM delivery_logs WHERE notification_id = $1 AND device_id = $2",
        )
        .bind(notification_id)
        .bind(device_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err("Failed to read previous delivery status"))
    }

    async fn apply_delta(
        tx: &mut Transaction<'static, Postgres>,
        notification_id: NotificationId,
        delta: CounterDelta,
    ) -> AppResult<()> {
        if delta.is_zero() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE notifications SET \
                total_sent = GREATEST(total_sent + $2, 0), \
                total_delivered = GREATEST(total_delivered + $3, 0), \
                total_failed = GREATEST(total_failed + $4, 0), \
                total_clicked = GREATEST(total_clicked + $5, 0), \
                updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(notification_id)
        .bind(delta.sent)
        .bind(delta.delivered)
        .bind(delta.failed)
        .bind(delta.clicked)
        .execute(&mut **tx)
        .await
        .map_err(db_err("Failed to update notification counters"))?;
        Ok(())
    }

    async fn write(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        outcome: &DeliveryOutcome,
        keep_existing_failure: bool,
    ) -> AppResult<Option<LedgerEntry>> {
        let mut tx = self.begin_for_pair(notification_id, device_id).await?;
        let previous = Self::previous_status(&mut tx, notification_id, device_id).await?;

        if keep_existing_failure && previous == Some(DeliveryStatus::Failed) {
            tx.rollback().await.map_err(db_err("Failed to release ledger lock"))?;
            return Ok(None);
        }

        let step = transition(previous, outcome.status());
        if step.write {
            let sent_at = matches!(outcome.kind, OutcomeKind::Success).then(Utc::now);
            sqlx::query(
                "INSERT INTO delivery_logs \
                    (id, notification_id, device_id, status, error_message, provider_response, \
                     attempt_count, status_code, sent_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (notification_id, device_id) DO UPDATE SET \
                    status = EXCLUDED.status, \
                    error_message = EXCLUDED.error_message, \
                    provider_response = EXCLUDED.provider_response, \
                    attempt_count = EXCLUDED.attempt_count, \
                    status_code = EXCLUDED.status_code, \
                    sent_at = COALESCE(EXCLUDED.sent_at, delivery_logs.sent_at), \
                    updated_at = NOW()",
            )
            .bind(DeliveryLogId::new())
            .bind(notification_id)
            .bind(device_id)
            .bind(step.status)
            .bind(&outcome.error)
            .bind(outcome.provider_response())
            .bind(outcome.attempt_count as i32)
            .bind(outcome.status_code.map(i32::from))
            .bind(sent_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to upsert delivery log"))?;
        }

        Self::apply_delta(&mut tx, notification_id, step.delta).await?;
        tx.commit().await.map_err(db_err("Failed to commit delivery log"))?;

        Ok(Some(LedgerEntry {
            previous,
            current: step.status,
            delta: step.delta,
        }))
    }
}

#[async_trait]
impl DeliveryLogStore for DeliveryLogRepository {
    async fn record(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        outcome: &DeliveryOutcome,
    ) -> AppResult<LedgerEntry> {
        self.write(notification_id, device_id, outcome, false)
            .await?
            .ok_or_else(|| AppError::internal("Ledger write skipped unexpectedly"))
    }

    async fn record_failure_once(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        outcome: &DeliveryOutcome,
    ) -> AppResult<Option<LedgerEntry>> {
        self.write(notification_id, device_id, outcome, true).await
    }

    async fn record_click(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tx = self.begin_for_pair(notification_id, device_id).await?;
        let previous = Self::previous_status(&mut tx, notification_id, device_id).await?;

        let Some(delta) = click_transition(previous) else {
            tx.rollback().await.map_err(db_err("Failed to release ledger lock"))?;
            return Ok(false);
        };

        sqlx::query(
            "UPDATE delivery_logs SET status = 'clicked', clicked_at = $3, updated_at = NOW() \
             WHERE notification_id = $1 AND device_id = $2",
        )
        .bind(notification_id)
        .bind(device_id)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to record click"))?;

        Self::apply_delta(&mut tx, notification_id, delta).await?;
        tx.commit().await.map_err(db_err("Failed to commit click"))?;
        Ok(true)
    }

    async fn find(
        &self,
        notification_id: NotificationId,
        device_id: DeviceId,
    ) -> AppResult<Option<DeliveryLog>> {
        sqlx::query_as::<_, DeliveryLog>(
            "SELECT * FROM delivery_logs WHERE notification_id = $1 AND device_id = $2",
        )
        .bind(notification_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to find delivery log"))
    }

    async fn list_for_notification(
        &self,
        notification_id: NotificationId,
    ) -> AppResult<Vec<DeliveryLog>> {
        sqlx::query_as::<_, DeliveryLog>(
            "SELECT * FROM delivery_logs WHERE notification_id = $1 ORDER BY created_at ASC",
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list delivery logs"))
    }

    async fn reconcile(&self, notification_id: NotificationId) -> AppResult<Reconciliation> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin reconciliation"))?;

        let row: Option<(i32, i32, i32, i32)> = sqlx::query_as(
            "SELECT total_sent, total_delivered, total_failed, total_clicked \
             FROM notifications WHERE id = $1 FOR UPDATE",
        )
        .bind(notification_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("Failed to lock notification"))?;

        let Some((total_sent, total_delivered, total_failed, total_clicked)) = row else {
            return Err(AppError::not_found(format!(
                "Notification {notification_id} not found"
            )));
        };
        let before = DeliveryCounters {
            total_sent,
            total_delivered,
            total_failed,
            total_clicked,
        };

        let statuses: Vec<DeliveryStatus> =
            sqlx::query_scalar("SELECT status FROM delivery_logs WHERE notification_id = $1")
                .bind(notification_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(db_err("Failed to read delivery statuses"))?;
        let after = DeliveryCounters::fold(statuses);

        sqlx::query(
            "UPDATE notifications SET total_sent = $2, total_delivered = $3, total_failed = $4, \
             total_clicked = $5, updated_at = NOW() WHERE id = $1",
        )
        .bind(notification_id)
        .bind(after.total_sent)
        .bind(after.total_delivered)
        .bind(after.total_failed)
        .bind(after.total_clicked)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to store reconciled counters"))?;

        tx.commit().await.map_err(db_err("Failed to commit reconciliation"))?;
        Ok(Reconciliation { before, after })
    }
}
