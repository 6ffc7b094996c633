//! The authoritative data source behind the caches.

use async_trait::async_trait;

use crate::model::{CheckIn, User, UserToken};

/// Read access to the forum database.
///
/// The caches only ever read through this trait. `Ok(None)` / an empty list
/// means "no such record"; errors are reported as-is and never cached.
#[async_trait]
pub trait ForumSource: Send + Sync + 'static {
    async fn user_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;

    /// Users ordered by descending score.
    async fn users_by_score(&self, limit: usize) -> anyhow::Result<Vec<User>>;

    /// Check-ins recorded on `day` (`YYYYMMDD`), earliest first.
    async fn check_in_rank(&self, day: i64, limit: usize) -> anyhow::Result<Vec<CheckIn>>;

    async fn user_token(&self, token: &str) -> anyhow::Result<Option<UserToken>>;

    /// Raw value of a `sys_config` row.
    async fn sys_config(&self, key: &str) -> anyhow::Result<Option<String>>;
}
