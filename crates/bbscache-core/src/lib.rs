//! Shared vocabulary for the bbscache crates.
//!
//! - [`CacheKey`]: canonical key representation shared by the local and remote tiers
//! - [`CacheError`] / [`LoadError`]: the error taxonomy every tier reports through
//! - [`codec`]: the serialization adapter used for values written to the remote store

pub mod codec;
pub mod error;
pub mod key;

pub use error::{CacheError, LoadError, Result};
pub use key::{CacheKey, day_bucket};
