//! Redis cache provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use pushhub_core::error::{AppError, ErrorKind};
use pushhub_core::result::AppResult;
use pushhub_core::traits::CacheProvider;

use super::client::RedisClient;

/// Redis-backed cache provider.
#[derive(Debug, Clone)]
pub struct RedisCacheProvider {
    client: RedisClient,
}

impl RedisCacheProvider {
    /// Create a new Redis cache provider.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::Cache, format!("Redis error: {e}"), e)
    }
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.conn();
        conn.get(self.client.prefixed_key(key))
            .await
            .map_err(Self::map_err)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.client.conn();
        // SET EX rejects zero.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(self.client.prefixed_key(key), value, seconds)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.client.conn();
        let _: () = conn
            .del(self.client.prefixed_key(key))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        let mut conn = self.client.conn();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(self.client.prefixed_key(pattern))
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        if keys.is_empty() {
            return Ok(0);
        }

        let count: u64 = conn.del(&keys).await.map_err(Self::map_err)?;
        debug!(pattern, count, "Deleted keys matching pattern");
        Ok(count)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }
}
