//! Composition root: builds the cache tiers and owns their background tasks.

use std::sync::Arc;
use std::time::Duration;

use bbscache_core::Result;
use bbscache_store::{CacheAside, RemoteStore, create_remote_store, is_remote_available};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::entities::ForumCaches;
use crate::hooks::CacheHooks;
use crate::observability::{LoggingSetup, apply_logging_config, log_cache_stats};
use crate::scheduler::{RefreshScheduler, SchedulerConfig};
use crate::source::ForumSource;

/// Every cache of the process and the tasks that maintain them.
pub struct CacheRuntime {
    store: Arc<dyn RemoteStore>,
    aside: CacheAside,
    caches: ForumCaches,
    hooks: CacheHooks,
    remote_ttl: Duration,
    logging: LoggingSetup,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl CacheRuntime {
    /// Connect the remote tier, build the entity caches and start the
    /// sweepers and the ranking scheduler.
    pub async fn start(config: &AppConfig, source: Arc<dyn ForumSource>) -> Result<Self> {
        let logging = apply_logging_config(&config.logging);
        let store = create_remote_store(&config.redis).await;
        if config.redis.enabled && !is_remote_available(store.as_ref()) {
            warn!("Redis configured but unavailable, remote tier is in-process only");
        }

        let aside =
            CacheAside::new(Arc::clone(&store)).degrade_to_source(config.cache.degrade_to_source);
        let caches = ForumCaches::new(source, &config.cache)?;
        let hooks = CacheHooks::new(caches.clone()).with_remote(Arc::clone(&store));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweep = config.cache.sweep_interval();
        let mut tasks = vec![
            caches.users.inner().spawn_sweeper(sweep, shutdown_rx.clone()),
            caches.tokens.inner().spawn_sweeper(sweep, shutdown_rx.clone()),
            caches.sys_config.inner().spawn_sweeper(sweep, shutdown_rx.clone()),
            caches.score_rank.inner().spawn_sweeper(sweep, shutdown_rx.clone()),
            caches.check_in_rank.inner().spawn_sweeper(sweep, shutdown_rx.clone()),
        ];
        let scheduler = RefreshScheduler::new(
            caches.clone(),
            SchedulerConfig {
                refresh_interval: config.cache.rank_refresh_interval(),
            },
        );
        tasks.push(scheduler.start(shutdown_rx));

        info!(
            backend = store.backend(),
            namespace = store.namespace().prefix(),
            log_level = %config.logging.level,
            logging = ?logging,
            "Cache runtime started"
        );

        Ok(Self {
            store,
            aside,
            caches,
            hooks,
            remote_ttl: config.cache.default_remote_ttl(),
            logging,
            shutdown_tx,
            tasks,
        })
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn aside(&self) -> &CacheAside {
        &self.aside
    }

    pub fn caches(&self) -> &ForumCaches {
        &self.caches
    }

    pub fn hooks(&self) -> &CacheHooks {
        &self.hooks
    }

    /// TTL for cache-aside writes.
    pub fn remote_ttl(&self) -> Duration {
        self.remote_ttl
    }

    /// How `logging.level` was applied at startup.
    pub fn logging_setup(&self) -> LoggingSetup {
        self.logging
    }

    /// Stop the background tasks and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Cache background task ended abnormally");
            }
        }
        log_cache_stats(&self.caches);
        info!("Cache runtime stopped");
    }
}
