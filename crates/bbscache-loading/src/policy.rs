//! Size and time bounds for a loading cache.

use std::time::Duration;

use bbscache_core::{CacheError, Result};

/// Bounds applied to a [`LoadingCache`](crate::LoadingCache).
///
/// Every bound is optional and they combine freely. The default policy is
/// unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Maximum number of entries. The least recently accessed entry is
    /// evicted to make room for a new key.
    pub max_entries: Option<usize>,
    /// Entries not read for this long are dropped.
    pub expire_after_access: Option<Duration>,
    /// Entries written longer ago than this are recomputed on the next read.
    pub refresh_after_write: Option<Duration>,
}

impl CachePolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn with_expire_after_access(mut self, ttl: Duration) -> Self {
        self.expire_after_access = Some(ttl);
        self
    }

    pub fn with_refresh_after_write(mut self, interval: Duration) -> Self {
        self.refresh_after_write = Some(interval);
        self
    }

    /// Reject bounds that would make the cache unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == Some(0) {
            return Err(CacheError::contract("max_entries must be greater than 0"));
        }
        if self.expire_after_access == Some(Duration::ZERO) {
            return Err(CacheError::contract(
                "expire_after_access must be greater than 0",
            ));
        }
        if self.refresh_after_write == Some(Duration::ZERO) {
            return Err(CacheError::contract(
                "refresh_after_write must be greater than 0",
            ));
        }
        Ok(())
    }
}
