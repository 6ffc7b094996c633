//! Forum records served through the caches.
//!
//! Timestamps are unix milliseconds, the representation the forum tables use.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Record is live.
pub const STATUS_OK: i32 = 0;
/// Record was soft-deleted.
pub const STATUS_DELETED: i32 = 1;
/// Record awaits moderation.
pub const STATUS_PENDING: i32 = 2;

/// Login token lifetime when `tokenExpireDays` is missing or invalid.
pub const DEFAULT_TOKEN_EXPIRE_DAYS: i64 = 3;

/// Keys of the `sys_config` table read through [`SysConfigCache`](crate::entities::SysConfigCache).
pub mod sys_config_keys {
    pub const TOKEN_EXPIRE_DAYS: &str = "tokenExpireDays";
    pub const ARTICLE_PENDING: &str = "articlePending";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub nickname: String,
    pub avatar: String,
    pub score: i64,
    pub status: i32,
    pub topic_count: i64,
    pub comment_count: i64,
    pub create_time: i64,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserToken {
    pub token: String,
    pub user_id: i64,
    pub expired_at: i64,
    pub status: i32,
    pub create_time: i64,
}

impl UserToken {
    /// Usable for authentication at `now_ms`: not deleted and not expired.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.status != STATUS_DELETED && self.expired_at > now_ms
    }
}

/// One user's check-in on a given day, as listed in the daily ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub user_id: i64,
    /// Day bucket, `YYYYMMDD`.
    pub latest_day_name: i64,
    pub consecutive_days: i64,
    pub update_time: i64,
}

/// Current time in unix milliseconds.
pub fn now_millis() -> i64 {
    let now = OffsetDateTime::now_utc();
    i64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
