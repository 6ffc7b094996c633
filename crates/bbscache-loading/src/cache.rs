//! The loading cache.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use bbscache_core::{CacheError, Result};
use dashmap::DashMap;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use crate::flight::{Begin, FlightRegistry, Outcome};
use crate::loader::Loader;
use crate::policy::CachePolicy;
use crate::stats::{CacheStats, Counters};

/// Monotonic nanoseconds since the cache was built.
struct Clock {
    epoch: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    #[inline]
    fn now(&self) -> u64 {
        nanos(self.epoch.elapsed())
    }
}

#[inline]
fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// A cached value.
///
/// The value sits behind an atomic pointer so a refresh can replace it while
/// readers holding the previous `Arc` keep their view.
struct CacheEntry<V> {
    value: ArcSwap<V>,
    written_at: AtomicU64,
    last_access: AtomicU64,
}

impl<V> CacheEntry<V> {
    fn new(value: Arc<V>, now: u64) -> Self {
        Self {
            value: ArcSwap::new(value),
            written_at: AtomicU64::new(now),
            last_access: AtomicU64::new(now),
        }
    }

    fn replace(&self, value: Arc<V>, now: u64) {
        self.value.store(value);
        self.written_at.store(now, Ordering::Relaxed);
        self.last_access.store(now, Ordering::Relaxed);
    }

    #[inline]
    fn touch(&self, now: u64) -> Arc<V> {
        self.last_access.store(now, Ordering::Relaxed);
        self.value.load_full()
    }
}

enum Lookup<V> {
    Fresh(Arc<V>),
    /// Present but due for refresh-after-write.
    Stale(Arc<V>),
    Missing,
}

struct Inner<K, V> {
    name: String,
    policy: CachePolicy,
    loader: Arc<dyn Loader<K, V>>,
    entries: DashMap<K, CacheEntry<V>>,
    flights: FlightRegistry<K, V>,
    /// Serializes insertion of new keys so the size bound holds.
    admission: Mutex<()>,
    clock: Clock,
    counters: Counters,
    expire_after_access: Option<u64>,
    refresh_after_write: Option<u64>,
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug + 'static,
    V: Send + Sync + 'static,
{
    #[inline]
    fn is_expired(&self, entry: &CacheEntry<V>, now: u64) -> bool {
        self.expire_after_access.is_some_and(|ttl| {
            now.saturating_sub(entry.last_access.load(Ordering::Relaxed)) > ttl
        })
    }

    #[inline]
    fn needs_refresh(&self, entry: &CacheEntry<V>, now: u64) -> bool {
        self.refresh_after_write.is_some_and(|interval| {
            now.saturating_sub(entry.written_at.load(Ordering::Relaxed)) >= interval
        })
    }

    fn lookup(&self, key: &K) -> Lookup<V> {
        let now = self.clock.now();
        match self.entries.get(key) {
            None => return Lookup::Missing,
            Some(entry) if !self.is_expired(&entry, now) => {
                let value = entry.touch(now);
                return if self.needs_refresh(&entry, now) {
                    Lookup::Stale(value)
                } else {
                    Lookup::Fresh(value)
                };
            }
            Some(_) => {}
        }
        self.remove_expired(key, now);
        Lookup::Missing
    }

    /// Live value without any bookkeeping beyond the access time.
    fn peek(&self, key: &K) -> Option<Arc<V>> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if self.is_expired(&entry, now) {
            return None;
        }
        Some(entry.touch(now))
    }

    fn remove_expired(&self, key: &K, now: u64) {
        if self
            .entries
            .remove_if(key, |_, entry| self.is_expired(entry, now))
            .is_some()
        {
            self.counters.evicted(1);
            tracing::trace!(cache = %self.name, key = ?key, "entry expired");
        }
    }

    /// Apply a completed load. Runs under the flight registry shard lock.
    fn publish(&self, key: &K, outcome: &Outcome<V>) {
        match outcome {
            Ok(Some(value)) => self.store(key, Arc::clone(value)),
            Ok(None) => {
                self.entries.remove(key);
            }
            Err(_) => {}
        }
    }

    fn store(&self, key: &K, value: Arc<V>) {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(key) {
            entry.replace(value, now);
            return;
        }

        let _admission = self.admission.lock();
        // another admission may have inserted the key meanwhile
        if let Some(entry) = self.entries.get(key) {
            entry.replace(value, now);
            return;
        }
        if let Some(max) = self.policy.max_entries {
            while self.entries.len() >= max {
                if !self.evict_lru() {
                    break;
                }
            }
        }
        self.entries.insert(key.clone(), CacheEntry::new(value, now));
    }

    /// Remove the least recently accessed entry. Caller holds `admission`.
    fn evict_lru(&self) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_access.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        let Some(victim) = victim else {
            return false;
        };
        if self.entries.remove(&victim).is_some() {
            self.counters.evicted(1);
            tracing::trace!(cache = %self.name, key = ?victim, "evicted least recently used entry");
        }
        true
    }

    /// Future for flight `id`: run the loader, then publish if still registered.
    fn flight(self: &Arc<Self>, key: &K, id: u64) -> BoxFuture<'static, Outcome<V>> {
        let inner = Arc::clone(self);
        let key = key.clone();
        async move {
            inner.counters.load();
            let outcome = match inner.loader.load(&key).await {
                Ok(Some(value)) => Ok(Some(Arc::new(value))),
                Ok(None) => {
                    tracing::debug!(cache = %inner.name, key = ?key, "loader returned no value");
                    Ok(None)
                }
                Err(e) => {
                    inner.counters.load_failure();
                    tracing::warn!(cache = %inner.name, key = ?key, error = %e, "load failed");
                    Err(CacheError::Load(e))
                }
            };
            let published = inner
                .flights
                .complete(&key, id, || inner.publish(&key, &outcome));
            if !published {
                tracing::debug!(cache = %inner.name, key = ?key, "load detached, result not cached");
            }
            outcome
        }
        .boxed()
    }
}

/// In-process cache that computes missing values through a [`Loader`].
///
/// Concurrent lookups of the same missing key share one loader call. Values
/// are handed out as `Arc<V>`; the cache never holds `None` or errors.
///
/// Cloning is cheap and clones share the same entries.
pub struct LoadingCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for LoadingCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for LoadingCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingCache")
            .field("name", &self.inner.name)
            .field("policy", &self.inner.policy)
            .field("size", &self.inner.entries.len())
            .finish()
    }
}

impl<K, V> LoadingCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug + 'static,
    V: Send + Sync + 'static,
{
    pub fn builder<L>(loader: L) -> LoadingCacheBuilder<K, V>
    where
        L: Loader<K, V>,
    {
        LoadingCacheBuilder {
            name: "cache".to_string(),
            policy: CachePolicy::default(),
            loader: Arc::new(loader),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    /// Get the value for `key`, loading it on a miss.
    ///
    /// Returns `Ok(None)` when the loader has no value. A load error is
    /// returned to every caller waiting on that load and is not cached.
    ///
    /// An entry due for refresh-after-write is reloaded inline. If that
    /// reload fails, or another load of the key is already running, the
    /// current value is returned instead.
    pub async fn get(&self, key: &K) -> Result<Option<Arc<V>>> {
        match self.inner.lookup(key) {
            Lookup::Fresh(value) => {
                self.inner.counters.hit();
                Ok(Some(value))
            }
            Lookup::Stale(stale) => {
                self.inner.counters.hit();
                self.refresh_stale(key, stale).await
            }
            Lookup::Missing => self.load(key).await,
        }
    }

    async fn load(&self, key: &K) -> Result<Option<Arc<V>>> {
        let inner = &self.inner;
        match inner
            .flights
            .begin(key, || inner.peek(key), |id| inner.flight(key, id))
        {
            Begin::Resolved(value) => {
                inner.counters.hit();
                Ok(Some(value))
            }
            Begin::Joined(flight) | Begin::Started(flight) => {
                inner.counters.miss();
                flight.await
            }
        }
    }

    async fn refresh_stale(&self, key: &K, stale: Arc<V>) -> Result<Option<Arc<V>>> {
        let inner = &self.inner;
        match inner.flights.begin(key, || None, |id| inner.flight(key, id)) {
            Begin::Started(flight) => match flight.await {
                Ok(fresh) => Ok(fresh),
                Err(e) => {
                    tracing::warn!(
                        cache = %inner.name,
                        key = ?key,
                        error = %e,
                        "refresh failed, serving previous value"
                    );
                    Ok(Some(stale))
                }
            },
            Begin::Joined(_) | Begin::Resolved(_) => Ok(Some(stale)),
        }
    }

    /// Recompute the value for `key` now.
    ///
    /// Readers keep getting the current value until the new one is swapped
    /// in. A refresh yielding no value removes the entry; a failed refresh
    /// leaves the current value in place and returns the error. Joins a load
    /// of the same key that is already running.
    pub async fn refresh(&self, key: &K) -> Result<Option<Arc<V>>> {
        let inner = &self.inner;
        match inner.flights.begin(key, || None, |id| inner.flight(key, id)) {
            Begin::Started(flight) | Begin::Joined(flight) => flight.await,
            Begin::Resolved(value) => Ok(Some(value)),
        }
    }

    /// Drop the entry for `key`.
    ///
    /// A load of `key` already running still answers its waiters, but its
    /// result is not stored.
    pub fn invalidate(&self, key: &K) {
        self.inner.flights.detach(key);
        if self.inner.entries.remove(key).is_some() {
            tracing::debug!(cache = %self.inner.name, key = ?key, "entry invalidated");
        }
    }

    pub fn invalidate_all(&self) {
        self.inner.flights.detach_all();
        self.inner.entries.clear();
        tracing::debug!(cache = %self.inner.name, "all entries invalidated");
    }

    /// Drop every entry past its expire-after-access bound.
    ///
    /// Returns the number of entries removed.
    pub fn run_maintenance(&self) -> usize {
        if self.inner.expire_after_access.is_none() {
            return 0;
        }
        let now = self.inner.clock.now();
        let before = self.inner.entries.len();
        self.inner
            .entries
            .retain(|_, entry| !self.inner.is_expired(entry, now));
        let removed = before.saturating_sub(self.inner.entries.len());
        self.inner.counters.evicted(removed as u64);
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Whether a live value is cached for `key`. Does not count as an access.
    pub fn contains_key(&self, key: &K) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .entries
            .get(key)
            .is_some_and(|entry| !self.inner.is_expired(&entry, now))
    }

    /// Whether a load of `key` is running.
    pub fn is_loading(&self, key: &K) -> bool {
        self.inner.flights.is_loading(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner
            .counters
            .snapshot(self.inner.entries.len(), self.inner.policy.max_entries)
    }
}

/// Builder for [`LoadingCache`].
pub struct LoadingCacheBuilder<K, V> {
    name: String,
    policy: CachePolicy,
    loader: Arc<dyn Loader<K, V>>,
}

impl<K, V> LoadingCacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug + 'static,
    V: Send + Sync + 'static,
{
    /// Name used in log records.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn maximum_size(mut self, max: usize) -> Self {
        self.policy.max_entries = Some(max);
        self
    }

    pub fn expire_after_access(mut self, ttl: Duration) -> Self {
        self.policy.expire_after_access = Some(ttl);
        self
    }

    pub fn refresh_after_write(mut self, interval: Duration) -> Self {
        self.policy.refresh_after_write = Some(interval);
        self
    }

    /// Validate the policy and build the cache.
    pub fn build(self) -> Result<LoadingCache<K, V>> {
        self.policy.validate()?;
        let policy = self.policy;
        Ok(LoadingCache {
            inner: Arc::new(Inner {
                name: self.name,
                policy,
                loader: self.loader,
                entries: DashMap::new(),
                flights: FlightRegistry::new(),
                admission: Mutex::new(()),
                clock: Clock::new(),
                counters: Counters::default(),
                expire_after_access: policy.expire_after_access.map(nanos),
                refresh_after_write: policy.refresh_after_write.map(nanos),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::loader_fn;
    use bbscache_core::LoadError;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn key(s: &str) -> String {
        s.to_string()
    }

    /// Loader returning `"<key>#<n>"` where `n` counts calls for any key.
    fn counting(
        delay: Duration,
    ) -> (Arc<AtomicUsize>, impl Loader<String, String>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let loader = loader_fn(move |k: String| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, LoadError>(Some(format!("{k}#{n}")))
            }
        });
        (calls, loader)
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_load() {
        let (calls, loader) = counting(Duration::from_millis(50));
        let cache = LoadingCache::builder(loader).build().unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(&key("cold")).await })
            })
            .collect();

        for task in tasks {
            let value = task.await.unwrap().unwrap().unwrap();
            assert_eq!(*value, "cold#1");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().loads, 1);
        assert!(!cache.is_loading(&key("cold")));
    }

    #[tokio::test]
    async fn hit_does_not_reload() {
        let (calls, loader) = counting(Duration::ZERO);
        let cache = LoadingCache::builder(loader).build().unwrap();

        cache.get(&key("a")).await.unwrap();
        cache.get(&key("a")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn absent_values_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: LoadingCache<String, String> = LoadingCache::builder(loader_fn(move |_k: String| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<Option<String>, LoadError>(None) }
        }))
        .build()
        .unwrap();

        assert!(cache.get(&key("ghost")).await.unwrap().is_none());
        assert!(cache.get(&key("ghost")).await.unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn errors_reach_every_waiter_and_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = LoadingCache::builder(loader_fn(move |_k: String| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                if n == 0 {
                    Err(LoadError::new("db down"))
                } else {
                    Ok(Some(n))
                }
            }
        }))
        .build()
        .unwrap();

        let k = key("k");
        let (a, b) = tokio::join!(cache.get(&k), cache.get(&k));
        assert!(matches!(a, Err(CacheError::Load(_))));
        assert!(matches!(b, Err(CacheError::Load(_))));
        assert!(!cache.contains_key(&key("k")));

        assert_eq!(*cache.get(&key("k")).await.unwrap().unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().load_failures, 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let (calls, loader) = counting(Duration::ZERO);
        let cache = LoadingCache::builder(loader).build().unwrap();

        assert_eq!(*cache.get(&key("user:42")).await.unwrap().unwrap(), "user:42#1");
        cache.invalidate(&key("user:42"));
        assert!(!cache.contains_key(&key("user:42")));
        assert_eq!(*cache.get(&key("user:42")).await.unwrap().unwrap(), "user:42#2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_during_load_discards_result() {
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        let cache = LoadingCache::builder(loader_fn(move |_k: String| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok::<_, LoadError>(Some("old".to_string()))
            }
        }))
        .build()
        .unwrap();

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&key("k")).await })
        };
        while !cache.is_loading(&key("k")) {
            tokio::task::yield_now().await;
        }

        cache.invalidate(&key("k"));
        release.notify_one();

        let value = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(*value, "old");
        assert!(!cache.contains_key(&key("k")));
    }

    #[tokio::test]
    async fn size_bound_evicts_least_recently_used() {
        let (_, loader) = counting(Duration::ZERO);
        let cache = LoadingCache::builder(loader)
            .maximum_size(3)
            .build()
            .unwrap();

        for k in ["a", "b", "c"] {
            cache.get(&key(k)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        // touch "a" so "b" becomes the oldest
        cache.get(&key("a")).await.unwrap();
        cache.get(&key("d")).await.unwrap();

        assert_eq!(cache.len(), 3);
        assert!(cache.contains_key(&key("a")));
        assert!(!cache.contains_key(&key("b")));
        assert!(cache.contains_key(&key("d")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn size_bound_holds_under_concurrency() {
        let (_, loader) = counting(Duration::from_millis(5));
        let cache = LoadingCache::builder(loader)
            .maximum_size(8)
            .build()
            .unwrap();

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(&format!("k{i}")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
            assert!(cache.len() <= 8);
        }
        assert_eq!(cache.len(), 8);
    }

    #[tokio::test]
    async fn expire_after_access() {
        let (calls, loader) = counting(Duration::ZERO);
        let cache = LoadingCache::builder(loader)
            .expire_after_access(Duration::from_millis(100))
            .build()
            .unwrap();

        cache.get(&key("k")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.get(&key("k")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.get(&key("k")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!cache.contains_key(&key("k")));
        assert_eq!(*cache.get(&key("k")).await.unwrap().unwrap(), "k#2");
    }

    #[tokio::test]
    async fn maintenance_sweeps_expired_entries() {
        let (_, loader) = counting(Duration::ZERO);
        let cache = LoadingCache::builder(loader)
            .expire_after_access(Duration::from_millis(20))
            .build()
            .unwrap();

        cache.get(&key("a")).await.unwrap();
        cache.get(&key("b")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.run_maintenance(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 2);
    }

    #[tokio::test]
    async fn refresh_swaps_value() {
        let (_, loader) = counting(Duration::ZERO);
        let cache = LoadingCache::builder(loader).build().unwrap();

        let before = cache.get(&key("rank")).await.unwrap().unwrap();
        let refreshed = cache.refresh(&key("rank")).await.unwrap().unwrap();
        assert_eq!(*before, "rank#1");
        assert_eq!(*refreshed, "rank#2");
        // the old view stays valid for whoever holds it
        assert_eq!(*before, "rank#1");
        assert_eq!(*cache.get(&key("rank")).await.unwrap().unwrap(), "rank#2");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = LoadingCache::builder(loader_fn(move |_k: String| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => Ok(Some("v1".to_string())),
                    1 => Err(LoadError::new("db down")),
                    _ => Ok(None),
                }
            }
        }))
        .build()
        .unwrap();

        cache.get(&key("k")).await.unwrap();
        assert!(cache.refresh(&key("k")).await.is_err());
        assert_eq!(*cache.get(&key("k")).await.unwrap().unwrap(), "v1");

        // a refresh finding nothing drops the entry
        assert!(cache.refresh(&key("k")).await.unwrap().is_none());
        assert!(!cache.contains_key(&key("k")));
    }

    #[tokio::test]
    async fn refresh_after_write_reloads_on_read() {
        let (calls, loader) = counting(Duration::ZERO);
        let cache = LoadingCache::builder(loader)
            .refresh_after_write(Duration::from_millis(30))
            .build()
            .unwrap();

        assert_eq!(*cache.get(&key("k")).await.unwrap().unwrap(), "k#1");
        assert_eq!(*cache.get(&key("k")).await.unwrap().unwrap(), "k#1");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*cache.get(&key("k")).await.unwrap().unwrap(), "k#2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_after_write_failure_serves_stale() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = LoadingCache::builder(loader_fn(move |_k: String| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok(Some("v1".to_string()))
                } else {
                    Err(LoadError::new("db down"))
                }
            }
        }))
        .refresh_after_write(Duration::from_millis(20))
        .build()
        .unwrap();

        cache.get(&key("k")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(*cache.get(&key("k")).await.unwrap().unwrap(), "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_in_flight_serves_stale_immediately() {
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = LoadingCache::builder(loader_fn(move |_k: String| {
            let gate = Arc::clone(&gate);
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n > 0 {
                    gate.notified().await;
                }
                Ok::<_, LoadError>(Some(format!("v{}", n + 1)))
            }
        }))
        .refresh_after_write(Duration::from_millis(20))
        .build()
        .unwrap();

        cache.get(&key("k")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let refreshing = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&key("k")).await })
        };
        while !cache.is_loading(&key("k")) {
            tokio::task::yield_now().await;
        }

        assert_eq!(*cache.get(&key("k")).await.unwrap().unwrap(), "v1");

        release.notify_one();
        assert_eq!(*refreshing.await.unwrap().unwrap().unwrap(), "v2");
        assert_eq!(*cache.get(&key("k")).await.unwrap().unwrap(), "v2");
    }

    #[tokio::test]
    async fn invalidate_all_clears() {
        let (_, loader) = counting(Duration::ZERO);
        let cache = LoadingCache::builder(loader).build().unwrap();
        cache.get(&key("a")).await.unwrap();
        cache.get(&key("b")).await.unwrap();

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let (_, loader) = counting(Duration::ZERO);
        let err = LoadingCache::builder(loader)
            .maximum_size(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, CacheError::Contract(_)));
    }
}
