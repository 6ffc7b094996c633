//! In-process loading cache for bbscache.
//!
//! A [`LoadingCache`] computes missing values through a [`Loader`] and keeps
//! them under a [`CachePolicy`]:
//!
//! - at most one load per key runs at a time, shared by every caller
//!   waiting on that key
//! - `max_entries` evicts the least recently accessed entry on insert
//! - `expire_after_access` drops entries that have not been read
//! - `refresh_after_write` recomputes entries on read once they are old
//!
//! ```ignore
//! let users = LoadingCache::builder(loader_fn(move |id: i64| {
//!     let db = db.clone();
//!     async move { db.user(id).await.map_err(LoadError::from_anyhow) }
//! }))
//! .name("user")
//! .maximum_size(1000)
//! .expire_after_access(Duration::from_secs(30 * 60))
//! .build()?;
//!
//! let user = users.get(&42).await?;
//! ```

mod cache;
mod flight;
pub mod loader;
mod maintenance;
pub mod policy;
pub mod stats;

pub use cache::{LoadingCache, LoadingCacheBuilder};
pub use loader::{FnLoader, Loader, loader_fn};
pub use policy::CachePolicy;
pub use stats::CacheStats;
