//! Loader abstraction: how a missing value is computed.

use std::future::Future;

use async_trait::async_trait;
use bbscache_core::LoadError;

/// Computes the value for a key from the authoritative source.
///
/// `Ok(None)` means the source has no value for the key. The cache never
/// stores `None`, so the next lookup asks the loader again.
#[async_trait]
pub trait Loader<K, V>: Send + Sync + 'static {
    async fn load(&self, key: &K) -> Result<Option<V>, LoadError>;
}

/// Loader backed by an async closure. Build one with [`loader_fn`].
pub struct FnLoader<F> {
    f: F,
}

/// Adapt an async closure taking the key by value into a [`Loader`].
///
/// ```ignore
/// let cache = LoadingCache::builder(loader_fn(|id: i64| async move { db.user(id).await }))
///     .maximum_size(1000)
///     .build()?;
/// ```
pub fn loader_fn<F>(f: F) -> FnLoader<F> {
    FnLoader { f }
}

#[async_trait]
impl<F, Fut, K, V> Loader<K, V> for FnLoader<F>
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<V>, LoadError>> + Send + 'static,
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    async fn load(&self, key: &K) -> Result<Option<V>, LoadError> {
        (self.f)(key.clone()).await
    }
}
