//! Provider credential repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use pushhub_core::error::{AppError, ErrorKind};
use pushhub_core::result::AppResult;
use pushhub_core::types::AppId;
use pushhub_entity::app::PlatformCredential;
use pushhub_entity::device::Platform;

use crate::store::CredentialStore;

/// Repository for per-app provider credentials.
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    pool: PgPool,
}

impl CredentialRepository {
    /// Create a new credential repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for CredentialRepository {
    async fn find(
        &self,
        app_id: AppId,
        platform: Platform,
    ) -> AppResult<Option<PlatformCredential>> {
        sqlx::query_as::<_, PlatformCredential>(
            "SELECT * FROM platform_credentials WHERE app_id = $1 AND platform = $2",
        )
        .bind(app_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load credentials", e))
    }

    async fn upsert(
        &self,
        app_id: AppId,
        platform: Platform,
        payload: &str,
    ) -> AppResult<PlatformCredential> {
        sqlx::query_as::<_, PlatformCredential>(
            "INSERT INTO platform_credentials (app_id, platform, payload) VALUES ($1, $2, $3) \
             ON CONFLICT (app_id, platform) DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW() \
             RETURNING *",
        )
        .bind(app_id)
        .bind(platform)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to store credentials", e))
    }
}
