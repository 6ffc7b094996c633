//! Cache-aside reads against the remote store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bbscache_core::{CacheError, LoadError, Result, codec};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::traits::{RemoteStore, RemoteStoreExt};

/// Read-through helper: serve from the remote store, fall back to a loader on
/// a miss and write the loaded value back.
///
/// ```ignore
/// let aside = CacheAside::new(store);
/// let user: Option<User> = aside
///     .get_or_load("user:42", Duration::from_secs(300), || async { source.user(42).await })
///     .await?;
/// ```
#[derive(Clone)]
pub struct CacheAside {
    store: Arc<dyn RemoteStore>,
    degrade_to_source: bool,
}

impl CacheAside {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            degrade_to_source: false,
        }
    }

    /// When enabled, a transport failure on the read is logged and the loader
    /// is consulted instead. Nothing is written back in that case.
    pub fn degrade_to_source(mut self, enabled: bool) -> Self {
        self.degrade_to_source = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub async fn get_or_load<T, F, Fut>(&self, key: &str, ttl: Duration, fallback: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, LoadError>>,
    {
        match self.store.get::<T>(key).await {
            Ok(value) => return Ok(Some(value)),
            Err(CacheError::NotFound { .. }) => {}
            Err(CacheError::Serialization(message)) => {
                tracing::warn!(key = %key, error = %message, "dropping undecodable cached value");
                if let Err(e) = self.store.delete(key).await {
                    tracing::warn!(key = %key, error = %e, "failed to drop undecodable cached value");
                }
            }
            Err(e) if e.is_transport() && self.degrade_to_source => {
                tracing::warn!(key = %key, error = %e, "remote store unavailable, reading from source");
                return Ok(fallback().await?);
            }
            Err(e) => return Err(e),
        }

        let Some(value) = fallback().await? else {
            return Ok(None);
        };

        let raw = match codec::encode(&value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "loaded value not encodable, skipping write-back");
                return Ok(Some(value));
            }
        };
        // empty collections are served but never cached
        if codec::is_empty_encoding(&raw) {
            tracing::debug!(key = %key, "loaded value is empty, skipping write-back");
            return Ok(Some(value));
        }
        if let Err(e) = self.store.set_raw(key, &raw, ttl).await {
            tracing::warn!(key = %key, error = %e, "failed to write loaded value back");
        }
        Ok(Some(value))
    }
}
