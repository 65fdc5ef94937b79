//! Notification repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use pushhub_core::error::{AppError, ErrorKind};
use pushhub_core::result::AppResult;
use pushhub_core::types::NotificationId;
use pushhub_entity::notification::{CreateNotification, DispatchClaim, Notification};

use crate::store::NotificationStore;

/// Repository for notification rows.
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    /// Create a new notification repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create(&self, data: &CreateNotification) -> AppResult<Notification> {
        sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (id, app_id, payload, status, scheduled_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(NotificationId::new())
        .bind(data.app_id)
        .bind(Json(&data.payload))
        .bind(data.initial_status())
        .bind(data.scheduled_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create notification", e))
    }

    async fn find_by_id(&self, id: NotificationId) -> AppResult<Option<Notification>> {
        sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find notification", e))
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications \
             WHERE status IN ('pending', 'scheduled') \
             AND (scheduled_at IS NULL OR scheduled_at <= $1) \
             AND (dispatch_started_at IS NULL OR dispatch_started_at < $2) \
             ORDER BY COALESCE(scheduled_at, created_at) ASC LIMIT $3",
        )
        .bind(now)
        .bind(stale_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list due notifications", e))
    }

    async fn claim_for_dispatch(
        &self,
        id: NotificationId,
        claim: &DispatchClaim,
    ) -> AppResult<Option<Notification>> {
        sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET dispatch_started_at = $2, dispatch_claim = $3, updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'scheduled') \
             AND (scheduled_at IS NULL OR scheduled_at <= $2) \
             AND (dispatch_started_at IS NULL OR dispatch_claim = $3 OR dispatch_started_at < $4) \
             RETURNING *",
        )
        .bind(id)
        .bind(claim.at)
        .bind(&claim.token)
        .bind(claim.stale_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim notification", e))
    }

    async fn release_claim(&self, id: NotificationId, token: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET dispatch_started_at = NULL, dispatch_claim = NULL, \
             updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'scheduled') AND dispatch_claim = $2",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to release dispatch claim", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_total_targets(&self, id: NotificationId, total: i32) -> AppResult<()> {
        sqlx::query("UPDATE notifications SET total_targets = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(total)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to set total targets", e))?;
        Ok(())
    }

    async fn mark_sent(&self, id: NotificationId) -> AppResult<()> {
        sqlx::query(
            "UPDATE notifications SET status = 'sent', sent_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'scheduled')",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark notification sent", e))?;
        Ok(())
    }

    async fn mark_failed(&self, id: NotificationId, reason: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE notifications SET status = 'failed', failure_reason = $2, updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'scheduled')",
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark notification failed", e))?;
        Ok(())
    }

    async fn cancel(&self, id: NotificationId) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'cancelled', updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'scheduled') AND dispatch_started_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to cancel notification", e))?;
        Ok(result.rows_affected() == 1)
    }
}
