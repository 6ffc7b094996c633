//! Background sweeping of expired entries.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::LoadingCache;

impl<K, V> LoadingCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug + 'static,
    V: Send + Sync + 'static,
{
    /// Start a task that calls [`LoadingCache::run_maintenance`] every `every`.
    ///
    /// The task stops once `shutdown` turns `true` or its sender is dropped.
    pub fn spawn_sweeper(
        &self,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = self.clone();

        tokio::spawn(async move {
            tracing::debug!(
                cache = %cache.name(),
                interval_ms = every.as_millis() as u64,
                "Cache sweeper started"
            );

            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.run_maintenance();
                        if removed > 0 {
                            tracing::debug!(cache = %cache.name(), removed, "Cache sweep completed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!(cache = %cache.name(), "Cache sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}
