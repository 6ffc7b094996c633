//! Single-flight registry.
//!
//! At most one load per key is in flight at any time. The first caller for a
//! key registers a shared future; later callers clone and await it, so every
//! waiter observes the same value or the same error.
//!
//! A flight publishes its result into the cache from inside the future through
//! [`FlightRegistry::complete`], and only if it is still the registered flight
//! for the key. [`FlightRegistry::detach`] unregisters a flight so whatever it
//! produces is handed to its waiters but never stored.
//!
//! Locking: the registry shard for a key is held only while registering or
//! completing a flight, never across the load itself. Callbacks run under that
//! shard lock may take cache locks, never the other way around.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bbscache_core::CacheError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

/// What a flight resolves to. `Ok(None)` means the loader had no value.
pub(crate) type Outcome<V> = Result<Option<Arc<V>>, CacheError>;

pub(crate) type SharedLoad<V> = Shared<BoxFuture<'static, Outcome<V>>>;

struct Flight<V> {
    id: u64,
    future: SharedLoad<V>,
}

/// Result of [`FlightRegistry::begin`].
pub(crate) enum Begin<V> {
    /// Another caller's flight was already running.
    Joined(SharedLoad<V>),
    /// This caller registered a new flight.
    Started(SharedLoad<V>),
    /// The recheck found a value, no flight was needed.
    Resolved(Arc<V>),
}

pub(crate) struct FlightRegistry<K, V> {
    flights: DashMap<K, Flight<V>>,
    next_id: AtomicU64,
}

impl<K, V> FlightRegistry<K, V>
where
    K: Hash + Eq + Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            flights: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Join the flight for `key` or start one.
    ///
    /// `recheck` runs under the registry shard lock before a new flight is
    /// created. A flight completes under the same lock, so a value published
    /// between the caller's own miss and this call is always seen here.
    /// `make` receives the id to pass back to [`FlightRegistry::complete`].
    pub(crate) fn begin<R, M>(&self, key: &K, recheck: R, make: M) -> Begin<V>
    where
        R: FnOnce() -> Option<Arc<V>>,
        M: FnOnce(u64) -> BoxFuture<'static, Outcome<V>>,
    {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(occupied) => Begin::Joined(occupied.get().future.clone()),
            Entry::Vacant(vacant) => {
                if let Some(value) = recheck() {
                    return Begin::Resolved(value);
                }
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let future = make(id).shared();
                vacant.insert(Flight {
                    id,
                    future: future.clone(),
                });
                Begin::Started(future)
            }
        }
    }

    /// Unregister flight `id` for `key`, running `publish` first if it is still
    /// the registered one. Returns whether `publish` ran.
    pub(crate) fn complete<P>(&self, key: &K, id: u64, publish: P) -> bool
    where
        P: FnOnce(),
    {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(occupied) if occupied.get().id == id => {
                publish();
                occupied.remove();
                true
            }
            _ => false,
        }
    }

    /// Forget the flight for `key`. Its waiters still get its result.
    pub(crate) fn detach(&self, key: &K) -> bool {
        self.flights.remove(key).is_some()
    }

    pub(crate) fn detach_all(&self) {
        self.flights.clear();
    }

    pub(crate) fn is_loading(&self, key: &K) -> bool {
        self.flights.contains_key(key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.flights.len()
    }
}
