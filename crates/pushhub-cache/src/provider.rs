//! Cache manager that dispatches to the configured provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use pushhub_core::config::CacheConfig;
use pushhub_core::error::AppError;
use pushhub_core::result::AppResult;
use pushhub_core::traits::CacheProvider;

/// Cache manager that wraps the configured cache provider.
#[derive(Debug, Clone)]
pub struct CacheManager {
    inner: Arc<dyn CacheProvider>,
    default_ttl: Duration,
}

impl CacheManager {
    /// Create a new cache manager from configuration.
    pub async fn new(config: &CacheConfig) -> AppResult<Self> {
        let inner: Arc<dyn CacheProvider> = match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis cache provider");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                Arc::new(crate::redis::RedisCacheProvider::new(client))
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory cache provider");
                Arc::new(crate::memory::MemoryCacheProvider::new(&config.memory))
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown cache provider: '{other}'. Supported: memory, redis"
                )));
            }
        };

        Ok(Self {
            inner,
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
        })
    }

    /// Create a cache manager from an existing provider.
    pub fn from_provider(provider: Arc<dyn CacheProvider>, default_ttl: Duration) -> Self {
        Self {
            inner: provider,
            default_ttl,
        }
    }

    /// In-memory cache with default settings.
    #[cfg(feature = "memory")]
    pub fn in_memory() -> Self {
        let config = CacheConfig::default();
        Self::from_provider(
            Arc::new(crate::memory::MemoryCacheProvider::new(&config.memory)),
            Duration::from_secs(config.default_ttl_seconds),
        )
    }

    /// TTL used by [`CacheManager::set_default`].
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Set a value with the configured default TTL.
    pub async fn set_default(&self, key: &str, value: &str) -> AppResult<()> {
        self.inner.set(key, value, self.default_ttl).await
    }
}

#[async_trait]
impl CacheProvider for CacheManager {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        self.inner.delete_pattern(pattern).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_provider_is_configuration_error() {
        let config = CacheConfig {
            provider: "memcached".to_string(),
            ..CacheConfig::default()
        };
        let err = CacheManager::new(&config).await.unwrap_err();
        assert_eq!(err.kind, pushhub_core::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_memory_manager_delegates() {
        let cache = CacheManager::new(&CacheConfig::default()).await.unwrap();
        cache.set_default("credentials:a:web", "{}").await.unwrap();
        assert_eq!(cache.get("credentials:a:web").await.unwrap().as_deref(), Some("{}"));
        assert!(cache.health_check().await.unwrap());
    }
}
