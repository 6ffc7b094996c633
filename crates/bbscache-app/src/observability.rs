//! Tracing setup and cache statistics logging.
//!
//! The subscriber filter sits behind a reload layer so [`CacheRuntime`]
//! can apply `logging.level` from the loaded configuration whether or not
//! tracing was already installed.
//!
//! [`CacheRuntime`]: crate::runtime::CacheRuntime

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;
use crate::entities::ForumCaches;

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// How [`apply_logging_config`] took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingSetup {
    /// The subscriber was installed with the configured level.
    Installed,
    /// The subscriber was already ours; its filter was swapped.
    Reloaded,
    /// `RUST_LOG` is set and wins over the configured level.
    EnvOverride,
    /// Another global subscriber is installed; nothing changed.
    Foreign,
}

/// Install the fmt subscriber filtered at `level`, unless `RUST_LOG` is set.
///
/// Returns `false` when a global subscriber already exists.
pub fn init_tracing_with_level(level: &str) -> bool {
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let installed = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init()
        .is_ok();
    if installed {
        let _ = LOG_RELOAD_HANDLE.set(handle);
    }
    installed
}

/// Swap the filter of the installed subscriber. Returns whether it changed.
pub fn apply_logging_level(level: &str) -> bool {
    let Some(handle) = LOG_RELOAD_HANDLE.get() else {
        return false;
    };
    match handle.modify(|f| *f = EnvFilter::new(level)) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(level, error = %e, "Failed to reload logging level");
            false
        }
    }
}

/// Bring tracing in line with `logging`: install on first use, reload after.
pub fn apply_logging_config(logging: &LoggingConfig) -> LoggingSetup {
    if std::env::var_os("RUST_LOG").is_some() {
        if LOG_RELOAD_HANDLE.get().is_none() {
            init_tracing_with_level(&logging.level);
        }
        return LoggingSetup::EnvOverride;
    }
    if apply_logging_level(&logging.level) {
        LoggingSetup::Reloaded
    } else if init_tracing_with_level(&logging.level) {
        LoggingSetup::Installed
    } else {
        LoggingSetup::Foreign
    }
}

/// Emit one `info` event per entity cache with its counters.
pub fn log_cache_stats(caches: &ForumCaches) {
    for (cache, stats) in caches.stats() {
        tracing::info!(
            cache = %cache,
            size = stats.size,
            max_size = ?stats.max_size,
            hits = stats.hits,
            misses = stats.misses,
            loads = stats.loads,
            load_failures = stats.load_failures,
            evictions = stats.evictions,
            hit_rate = stats.hit_rate(),
            "Cache statistics"
        );
    }
}
