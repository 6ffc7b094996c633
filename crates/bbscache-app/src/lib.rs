//! Forum caches built on the bbscache tiers.
//!
//! [`CacheRuntime::start`] wires everything from an [`AppConfig`] and a
//! [`ForumSource`]:
//!
//! - the remote store (Redis, or the in-process fallback) and a [`CacheAside`](bbscache_store::CacheAside) over it
//! - the entity caches in [`entities`]
//! - [`CacheHooks`] for post-commit invalidation
//! - expired-entry sweepers and the [`RefreshScheduler`]

pub mod config;
pub mod entities;
pub mod hooks;
pub mod model;
pub mod observability;
pub mod runtime;
pub mod scheduler;
pub mod source;

pub use config::{AppConfig, ConfigError};
pub use entities::ForumCaches;
pub use hooks::{CacheHooks, Invalidation};
pub use runtime::CacheRuntime;
pub use scheduler::{RefreshScheduler, SchedulerConfig};
pub use source::ForumSource;
