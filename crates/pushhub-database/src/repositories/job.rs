//! Job repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pushhub_core::error::{AppError, ErrorKind};
use pushhub_core::result::AppResult;
use pushhub_core::types::JobId;
use pushhub_entity::job::{CreateJob, Job, JobStatus};

use crate::store::{JobStore, LEASE_EXPIRED, StaleJobs};

/// Repository for queue jobs.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn create(&self, data: &CreateJob) -> AppResult<Job> {
        let inserted = sqlx::query_as::<_, Job>(
            "INSERT INTO jobs (id, job_type, queue, priority, payload, max_attempts, scheduled_at, dedupe_key) \
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, NOW()), $8) \
             ON CONFLICT (dedupe_key) WHERE dedupe_key IS NOT NULL DO NOTHING \
             RETURNING *",
        )
        .bind(JobId::new())
        .bind(&data.job_type)
        .bind(&data.queue)
        .bind(data.priority)
        .bind(&data.payload)
        .bind(data.max_attempts)
        .bind(data.scheduled_at)
        .bind(&data.dedupe_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create job", e))?;

        if let Some(job) = inserted {
            return Ok(job);
        }
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE dedupe_key = $1")
            .bind(&data.dedupe_key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find deduplicated job", e))
    }

    async fn find_by_id(&self, id: JobId) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find job", e))
    }

    async fn claim_next(&self, queue: &str, worker_id: &str) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>(
            "UPDATE jobs SET status = 'running', started_at = NOW(), worker_id = $2, \
             attempts = attempts + 1, updated_at = NOW() \
             WHERE id = ( \
                SELECT id FROM jobs \
                WHERE queue = $1 AND status = 'pending' AND scheduled_at <= NOW() \
                ORDER BY priority DESC, scheduled_at ASC \
                FOR UPDATE SKIP LOCKED \
                LIMIT 1 \
             ) RETURNING *",
        )
        .bind(queue)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim job", e))
    }

    async fn complete(&self, id: JobId, result: Option<&serde_json::Value>) -> AppResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', result = $2, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to complete job", e))?;
        Ok(())
    }

    async fn fail(&self, id: JobId, error_message: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'failed', error_message = $2, completed_at = NOW(), \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark job as failed", e))?;
        Ok(())
    }

    async fn retry(&self, id: JobId, error_message: &str, run_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'pending', error_message = $2, scheduled_at = $3, \
             started_at = NULL, worker_id = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(error_message)
        .bind(run_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to requeue job", e))?;
        Ok(())
    }

    async fn cancel(&self, id: JobId) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to cancel job", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_by_status(&self, status: JobStatus, limit: i64) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE status = $1 ORDER BY updated_at DESC LIMIT $2",
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list jobs", e))
    }

    async fn count_by_status(&self) -> AppResult<Vec<(JobStatus, i64)>> {
        sqlx::query_as::<_, (JobStatus, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count jobs", e))
    }

    async fn cleanup_old(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('completed', 'failed', 'cancelled') AND updated_at < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to cleanup jobs", e))?;
        Ok(result.rows_affected())
    }

    async fn requeue_stale(&self, started_before: DateTime<Utc>) -> AppResult<StaleJobs> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))?;

        let requeued = sqlx::query(
            "UPDATE jobs SET status = 'pending', error_message = $2, scheduled_at = NOW(), \
             started_at = NULL, worker_id = NULL, updated_at = NOW() \
             WHERE status = 'running' AND started_at < $1 AND attempts <= max_attempts",
        )
        .bind(started_before)
        .bind(LEASE_EXPIRED)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to requeue stale jobs", e))?
        .rows_affected();

        let failed = sqlx::query(
            "UPDATE jobs SET status = 'failed', error_message = $2, completed_at = NOW(), \
             updated_at = NOW() \
             WHERE status = 'running' AND started_at < $1",
        )
        .bind(started_before)
        .bind(LEASE_EXPIRED)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to fail stale jobs", e))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e))?;
        Ok(StaleJobs { requeued, failed })
    }
}
