//! Error taxonomy shared by the remote store, the cache-aside orchestrator and
//! the loading cache.
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | [`CacheError::NotFound`] | expected miss, never logged as an error |
//! | [`CacheError::Transport`] | remote store or network failure |
//! | [`CacheError::Timeout`] | remote call exceeded its deadline |
//! | [`CacheError::Serialization`] | value could not be encoded/decoded |
//! | [`CacheError::Load`] | authoritative source failed while loading |
//! | [`CacheError::Contract`] | programming error, reported immediately |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors reported by every cache tier.
///
/// The type is `Clone` so that a single load failure can be handed to every
/// caller waiting on the same in-flight load.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// No value is stored under the key. This is a cacheable miss, not a fault.
    #[error("Cache miss for key: {key}")]
    NotFound {
        /// The (un-namespaced) key that missed.
        key: String,
    },

    /// The remote store or the connection to it failed.
    #[error("Remote store {op} failed: {message}")]
    Transport {
        /// Store operation, e.g. `GET`.
        op: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// The remote call did not finish before its deadline.
    #[error("Remote store {op} timed out after {after:?}")]
    Timeout {
        /// Store operation, e.g. `GET`.
        op: &'static str,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// Encoding or decoding a value failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The loader (authoritative source) failed.
    #[error("Load failed: {0}")]
    Load(#[from] LoadError),

    /// The caller violated the API contract.
    #[error("Contract violation: {0}")]
    Contract(String),
}

impl CacheError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(op: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            op,
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(op: &'static str, after: Duration) -> Self {
        Self::Timeout { op, after }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Creates a new `Contract` error.
    #[must_use]
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract(message.into())
    }

    /// Returns `true` for a cacheable miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for failures of the remote store itself (including timeouts).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Failure reported by a loader querying the authoritative source.
#[derive(Clone)]
pub struct LoadError {
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, keeping it reachable through `source()`.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Convert an `anyhow` error coming from application loaders.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let source: Box<dyn std::error::Error + Send + Sync + 'static> = err.into();
        Self {
            message,
            source: Some(Arc::from(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadError")
            .field("message", &self.message)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn classification() {
        assert!(CacheError::not_found("k").is_not_found());
        assert!(!CacheError::not_found("k").is_transport());
        assert!(CacheError::transport("GET", "refused").is_transport());
        assert!(CacheError::timeout("GET", Duration::from_millis(5)).is_transport());
        assert!(!CacheError::contract("bad").is_transport());
    }

    #[test]
    fn load_error_keeps_source() {
        let io = std::io::Error::other("db down");
        let err = LoadError::with_source("query user failed", io);
        assert_eq!(err.to_string(), "query user failed");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("db down"));

        let cache_err = CacheError::from(err.clone());
        assert_eq!(cache_err.to_string(), "Load failed: query user failed");
    }

    #[test]
    fn load_error_from_anyhow() {
        let err = LoadError::from_anyhow(anyhow::anyhow!("inner").context("outer"));
        assert_eq!(err.message(), "outer: inner");
        assert!(err.source().is_some());
    }
}
