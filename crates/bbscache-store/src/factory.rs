//! Remote store construction with graceful degradation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::memory::MemoryStore;
use crate::namespace::{DEFAULT_PREFIX, Namespace};
use crate::redis_store::RedisStore;
use crate::traits::RemoteStore;

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Use Redis at all. When disabled the in-process store is used.
    /// Default: false
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Per-call deadline and pool timeouts in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Prefix applied to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_key_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RedisStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.key_prefix)
    }
}

/// Build the remote store for this process.
///
/// Returns a [`RedisStore`] when Redis is enabled and answers a connection
/// attempt; otherwise logs a warning and falls back to [`MemoryStore`].
pub async fn create_remote_store(config: &RedisStoreConfig) -> Arc<dyn RemoteStore> {
    let namespace = config.namespace();

    if !config.enabled {
        tracing::info!("Redis disabled, using in-process store only");
        return Arc::new(MemoryStore::new(namespace));
    }

    tracing::info!(url = %config.url, prefix = %namespace.prefix(), "Connecting to Redis");

    let timeout = config.timeout();
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(|| deadpool_redis::PoolConfig::new(config.pool_size));
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-process store."
            );
            return Arc::new(MemoryStore::new(namespace));
        }
    };

    let store = RedisStore::new(pool, namespace.clone()).with_deadline(timeout);
    if store.ping().await {
        tracing::info!("Connected to Redis");
        Arc::new(store)
    } else {
        tracing::warn!("Failed to reach Redis. Falling back to in-process store.");
        Arc::new(MemoryStore::new(namespace))
    }
}

/// Whether `store` talks to a shared Redis rather than the in-process fallback.
pub fn is_remote_available(store: &dyn RemoteStore) -> bool {
    store.backend() == "redis"
}
