//! Key namespacing for the shared remote keyspace.

use std::sync::Arc;

/// Prefix applied when none is configured.
pub const DEFAULT_PREFIX: &str = "fbi:";

/// Process-wide key prefix.
///
/// Every store implementation routes each key through [`Namespace::apply`]
/// exactly once, right before the wire call. Callers always pass bare keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    prefix: Arc<str>,
}

impl Namespace {
    pub fn new(prefix: impl AsRef<str>) -> Self {
        Self {
            prefix: Arc::from(prefix.as_ref()),
        }
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Qualify a bare key, e.g. `user:1` -> `fbi:user:1`.
    #[inline]
    pub fn apply(&self, key: &str) -> String {
        let mut full = String::with_capacity(self.prefix.len() + key.len());
        full.push_str(&self.prefix);
        full.push_str(key);
        full
    }

    /// Recover the bare key from a qualified one.
    pub fn strip<'a>(&self, full: &'a str) -> Option<&'a str> {
        full.strip_prefix(&*self.prefix)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
