//! Device repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use pushhub_core::error::{AppError, ErrorKind};
use pushhub_core::result::AppResult;
use pushhub_core::types::{AppId, DeviceId};
use pushhub_entity::device::{Device, DeviceStatus, RegisterDevice};

use crate::store::DeviceStore;

/// Repository for device rows.
#[derive(Debug, Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    /// Create a new device repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Conditionally move a deliverable device to `status`.
    async fn transition(&self, id: DeviceId, status: DeviceStatus, reason: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE devices SET status = $2, last_error = $3, updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'active')",
        )
        .bind(id)
        .bind(status)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update device status", e))?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl DeviceStore for DeviceRepository {
    async fn register(&self, data: &RegisterDevice) -> AppResult<Device> {
        sqlx::query_as::<_, Device>(
            "INSERT INTO devices (id, app_id, platform, token, p256dh, auth_secret, credential_fingerprint) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (app_id, platform, token) DO UPDATE SET \
                p256dh = EXCLUDED.p256dh, auth_secret = EXCLUDED.auth_secret, \
                credential_fingerprint = EXCLUDED.credential_fingerprint, \
                status = 'pending', last_error = NULL, updated_at = NOW() \
             RETURNING *",
        )
        .bind(DeviceId::new())
        .bind(data.app_id)
        .bind(data.platform)
        .bind(&data.token)
        .bind(&data.p256dh)
        .bind(&data.auth_secret)
        .bind(&data.credential_fingerprint)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to register device", e))
    }

    async fn find_by_id(&self, id: DeviceId) -> AppResult<Option<Device>> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find device", e))
    }

    async fn find_deliverable(&self, app_id: AppId) -> AppResult<Vec<Device>> {
        sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE app_id = $1 AND status IN ('pending', 'active') \
             ORDER BY created_at ASC",
        )
        .bind(app_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list devices", e))
    }

    async fn mark_active(&self, id: DeviceId) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE devices SET status = 'active', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to activate device", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn expire(&self, id: DeviceId, reason: &str) -> AppResult<bool> {
        self.transition(id, DeviceStatus::Expired, reason).await
    }

    async fn deactivate(&self, id: DeviceId, reason: &str) -> AppResult<bool> {
        self.transition(id, DeviceStatus::Inactive, reason).await
    }
}
