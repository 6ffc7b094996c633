//! Cache key representation.
//!
//! Every lookup, local or remote, goes through [`CacheKey`]. Keys built from
//! logically equal inputs compare and hash identically, so a user id `7` and
//! the string `"7"` address the same entry.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Separator used by [`CacheKey::composite`].
pub const KEY_SEPARATOR: char = ':';

/// Opaque, hashable cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Join several parts with `:`, e.g. `["user", "42"]` -> `user:42`.
    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(part.as_ref());
        }
        Self(key)
    }

    /// Day-granularity bucket key (`YYYYMMDD`) for the given instant.
    pub fn day(at: OffsetDateTime) -> Self {
        Self::from(day_bucket(at))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a numeric key back into an id.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Day bucket as a number, e.g. `20261016`.
pub fn day_bucket(at: OffsetDateTime) -> i64 {
    i64::from(at.year()) * 10_000 + i64::from(u8::from(at.month())) * 100 + i64::from(at.day())
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for CacheKey {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl From<i64> for CacheKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for CacheKey {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for CacheKey {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}
