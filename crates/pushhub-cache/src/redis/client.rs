//! Redis connection management.

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use pushhub_core::config::cache::RedisCacheConfig;
use pushhub_core::config::mask_url_password;
use pushhub_core::error::{AppError, ErrorKind};
use pushhub_core::result::AppResult;

/// Reconnecting Redis connection plus the key prefix applied to every key.
#[derive(Debug, Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisClient {
    /// Create a new Redis client from configuration.
    pub async fn connect(config: &RedisCacheConfig) -> AppResult<Self> {
        info!(url = %mask_url_password(&config.url), "Connecting to Redis");

        let client = Client::open(config.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to create Redis client", e)
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to connect to Redis", e)
        })?;

        info!("Connected to Redis");
        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// A handle to the shared connection.
    pub fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Build a full key with the configured prefix.
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}
