//! Namespaced remote key-value store client for bbscache.
//!
//! - [`RemoteStore`]: raw string operations over strings, hashes, lists,
//!   sorted sets and counters, with [`RemoteStoreExt`] adding JSON-encoded
//!   variants.
//! - [`RedisStore`]: Redis implementation with per-call deadlines.
//! - [`MemoryStore`]: in-process fallback with the same semantics.
//! - [`CacheAside`]: read-through helper with write-back on miss.

pub mod aside;
pub mod factory;
pub mod memory;
pub mod namespace;
pub mod redis_store;
pub mod traits;

pub use aside::CacheAside;
pub use factory::{RedisStoreConfig, create_remote_store, is_remote_available};
pub use memory::MemoryStore;
pub use namespace::{DEFAULT_PREFIX, Namespace};
pub use redis_store::RedisStore;
pub use traits::{ListSide, RemoteStore, RemoteStoreExt, ScoreRange, wrap_error};
