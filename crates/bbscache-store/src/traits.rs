//! Remote store contract.
//!
//! [`RemoteStore`] exposes raw string operations and is object safe so the
//! composition root can hold an `Arc<dyn RemoteStore>` regardless of backend.
//! [`RemoteStoreExt`] layers the serialized variants on top. Raw and
//! serialized writes are separate methods rather than a flag.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bbscache_core::{CacheError, Result, codec};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::namespace::Namespace;

/// Which end of a list a push targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSide {
    Left,
    Right,
}

/// Score bounds for sorted-set range queries.
///
/// Bounds are strings so Redis syntax passes through unchanged:
/// `-inf`, `+inf`, and `(` for exclusive bounds (`(10`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRange {
    pub min: String,
    pub max: String,
    /// `(offset, count)` for pagination.
    pub limit: Option<(i64, i64)>,
}

impl ScoreRange {
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
            limit: None,
        }
    }

    /// The whole set, lowest score first.
    pub fn all() -> Self {
        Self::new("-inf", "+inf")
    }

    /// Restrict the result to `count` members starting at `offset`.
    ///
    /// A zero offset and count leaves the range unpaginated.
    pub fn page(mut self, offset: i64, count: i64) -> Self {
        self.limit = if offset == 0 && count == 0 {
            None
        } else {
            Some((offset, count))
        };
        self
    }
}

/// Route a store failure through one place so it is logged consistently.
///
/// Misses are expected and only traced; everything else is logged as an
/// error with the operation and key attached.
pub fn wrap_error(op: &'static str, key: &str, err: CacheError) -> CacheError {
    match &err {
        CacheError::NotFound { .. } => {
            tracing::trace!(op, key = %key, "remote miss");
        }
        _ => {
            tracing::error!(op, key = %key, error = %err, "remote store error");
        }
    }
    err
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Namespaced key-value store operations on raw strings.
///
/// Keys passed in are bare; implementations apply [`RemoteStore::namespace`].
/// `ttl == Duration::ZERO` means "no expiry" wherever a TTL is accepted.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Namespace applied to every key.
    fn namespace(&self) -> &Namespace;

    /// Short backend name for logs and health checks.
    fn backend(&self) -> &'static str;

    /// Whether the backend is currently reachable.
    async fn ping(&self) -> bool;

    /// Fetch a flat string. Absent keys yield [`CacheError::NotFound`].
    async fn get_raw(&self, key: &str) -> Result<String>;

    /// Store a flat string verbatim.
    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Set a TTL on an existing key. Returns `false` when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Atomically increment an integer, returning the new value.
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn hget_raw(&self, key: &str, field: &str) -> Result<String>;

    async fn hset_raw(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Positional HMGET reply with `None` for absent fields.
    ///
    /// Most callers want [`RemoteStore::hmget`].
    async fn hmget_slots(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>>;

    async fn hmset_raw(&self, key: &str, entries: &[(String, String)]) -> Result<()>;

    async fn hdel(&self, key: &str, field: &str) -> Result<()>;

    async fn hkeys(&self, key: &str) -> Result<Vec<String>>;

    /// Push one or more values. `values` is never empty.
    async fn push(&self, key: &str, side: ListSide, values: &[String]) -> Result<()>;

    async fn rpop(&self, key: &str) -> Result<Option<String>>;

    /// Blocking pop from the right. Returns `Ok(None)` when `timeout` elapses.
    ///
    /// A zero `timeout` does not block: it pops once and returns `Ok(None)`
    /// on an empty list.
    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>>;

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()>;

    async fn zrange_by_score(&self, key: &str, range: &ScoreRange) -> Result<Vec<String>>;

    /// Remove members within the score bounds, returning how many were removed.
    async fn zrem_range_by_score(&self, key: &str, min: &str, max: &str) -> Result<u64>;

    async fn zrem(&self, key: &str, member: &str) -> Result<()>;

    /// Values of the requested fields that exist.
    ///
    /// Absent fields are dropped, so the result is not index-aligned with
    /// `fields`.
    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<String>> {
        let slots = self.hmget_slots(key, fields).await?;
        Ok(slots.into_iter().flatten().collect())
    }

    async fn hset_and_expire(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<()> {
        self.hset_raw(key, field, value).await?;
        self.expire(key, ttl).await?;
        Ok(())
    }

    /// Push to the head of a list. Blank values are skipped.
    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        if is_blank(value) {
            return Ok(());
        }
        self.push(key, ListSide::Left, &[value.to_string()]).await
    }

    /// Push several values to the head of a list. Blank values are skipped and
    /// an empty batch is a no-op.
    async fn lpush_n(&self, key: &str, values: &[String]) -> Result<()> {
        let values: Vec<String> = values.iter().filter(|v| !is_blank(v)).cloned().collect();
        if values.is_empty() {
            return Ok(());
        }
        self.push(key, ListSide::Left, &values).await
    }

    /// Push to the tail of a list. Blank values are skipped.
    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        if is_blank(value) {
            return Ok(());
        }
        self.push(key, ListSide::Right, &[value.to_string()]).await
    }
}

/// Serialized variants of the raw operations.
pub trait RemoteStoreExt: RemoteStore {
    /// Fetch and decode a value stored with [`RemoteStoreExt::set`].
    fn get<T>(&self, key: &str) -> impl Future<Output = Result<T>> + Send
    where
        T: DeserializeOwned + Send,
    {
        async move {
            let raw = self.get_raw(key).await?;
            codec::decode(&raw).map_err(|e| wrap_error("GET", key, e))
        }
    }

    /// Encode and store a value.
    fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> impl Future<Output = Result<()>> + Send
    where
        T: Serialize + Sync + ?Sized,
    {
        async move {
            let raw = codec::encode(value).map_err(|e| wrap_error("SET", key, e))?;
            self.set_raw(key, &raw, ttl).await
        }
    }

    fn hget<T>(&self, key: &str, field: &str) -> impl Future<Output = Result<T>> + Send
    where
        T: DeserializeOwned + Send,
    {
        async move {
            let raw = self.hget_raw(key, field).await?;
            codec::decode(&raw).map_err(|e| wrap_error("HGET", key, e))
        }
    }

    fn hset<T>(&self, key: &str, field: &str, value: &T) -> impl Future<Output = Result<()>> + Send
    where
        T: Serialize + Sync + ?Sized,
    {
        async move {
            let raw = codec::encode(value).map_err(|e| wrap_error("HSET", key, e))?;
            self.hset_raw(key, field, &raw).await
        }
    }

    fn hmset<T>(&self, key: &str, entries: &[(&str, &T)]) -> impl Future<Output = Result<()>> + Send
    where
        T: Serialize + Sync,
    {
        async move {
            let encoded = codec::encode_fields(entries.iter().map(|(f, v)| (*f, *v)))
                .map_err(|e| wrap_error("HMSET", key, e))?;
            self.hmset_raw(key, &encoded).await
        }
    }
}

impl<S: RemoteStore + ?Sized> RemoteStoreExt for S {}
