//! Entity caches for the forum records.
//!
//! Each cache wraps a [`LoadingCache`] keyed by [`CacheKey`] and loads through
//! the [`ForumSource`]. Lookups never fail: a failed load is logged and the
//! caller sees `None`, the same answer as for a missing record.

mod rank;
mod sys_config;
mod token;
mod user;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bbscache_core::{CacheKey, LoadError, Result};
use bbscache_loading::{CachePolicy, CacheStats, LoadingCache, loader_fn};

use crate::config::CacheConfig;
use crate::model::User;
use crate::source::ForumSource;

pub use rank::{CheckInRankCache, ScoreRankCache};
pub use sys_config::SysConfigCache;
pub use token::UserTokenCache;
pub use user::UserCache;

/// Build a cache whose loader calls `load` with the shared source.
fn source_cache<V, F, Fut>(
    name: &str,
    policy: CachePolicy,
    source: &Arc<dyn ForumSource>,
    load: F,
) -> Result<LoadingCache<CacheKey, V>>
where
    V: Send + Sync + 'static,
    F: Fn(Arc<dyn ForumSource>, CacheKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<V>>> + Send + 'static,
{
    let source = Arc::clone(source);
    LoadingCache::builder(loader_fn(move |key: CacheKey| {
        let fut = load(Arc::clone(&source), key);
        async move { fut.await.map_err(LoadError::from_anyhow) }
    }))
    .name(name)
    .policy(policy)
    .build()
}

/// Collapse a lookup result to an option, logging failures.
fn or_none<V>(
    cache: &str,
    key: impl fmt::Display,
    result: Result<Option<Arc<V>>>,
) -> Option<Arc<V>> {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(cache, key = %key, error = %e, "Cache lookup failed");
            None
        }
    }
}

/// All entity caches of the forum, built from one source.
#[derive(Clone)]
pub struct ForumCaches {
    pub users: UserCache,
    pub score_rank: ScoreRankCache,
    pub check_in_rank: CheckInRankCache,
    pub tokens: UserTokenCache,
    pub sys_config: SysConfigCache,
}

impl ForumCaches {
    pub fn new(source: Arc<dyn ForumSource>, config: &CacheConfig) -> Result<Self> {
        Ok(Self {
            users: UserCache::new(&source, config.user.policy(UserCache::default_policy()))?,
            score_rank: ScoreRankCache::new(
                &source,
                config.score_rank.policy(ScoreRankCache::default_policy()),
            )?,
            check_in_rank: CheckInRankCache::new(
                &source,
                config
                    .check_in_rank
                    .policy(CheckInRankCache::default_policy()),
            )?,
            tokens: UserTokenCache::new(
                &source,
                config.user_token.policy(UserTokenCache::default_policy()),
            )?,
            sys_config: SysConfigCache::new(
                &source,
                config.sys_config.policy(SysConfigCache::default_policy()),
            )?,
        })
    }

    /// Resolve the signed-in user for a session token.
    ///
    /// Returns `None` unless the token is active, not expired and belongs to
    /// an existing user whose status is OK.
    pub async fn current_user(&self, token: &str) -> Option<Arc<User>> {
        or_none("current_user", token, self.try_current_user(token).await)
    }

    /// Like [`ForumCaches::current_user`] but reports source failures.
    pub async fn try_current_user(&self, token: &str) -> Result<Option<Arc<User>>> {
        let Some(user_token) = self.tokens.try_get(token).await? else {
            return Ok(None);
        };
        let user = self.users.try_get(user_token.user_id).await?;
        Ok(user.filter(|u| u.is_active()))
    }

    /// Drop every cached entry. Used after bulk imports.
    pub fn invalidate_all(&self) {
        self.users.inner().invalidate_all();
        self.score_rank.inner().invalidate_all();
        self.check_in_rank.inner().invalidate_all();
        self.tokens.inner().invalidate_all();
        self.sys_config.inner().invalidate_all();
    }

    /// Remove expired entries from every cache, returning how many were dropped.
    pub fn run_maintenance(&self) -> usize {
        self.users.inner().run_maintenance()
            + self.score_rank.inner().run_maintenance()
            + self.check_in_rank.inner().run_maintenance()
            + self.tokens.inner().run_maintenance()
            + self.sys_config.inner().run_maintenance()
    }

    /// Per-cache statistics, keyed by cache name.
    pub fn stats(&self) -> Vec<(String, CacheStats)> {
        fn entry<V>(cache: &LoadingCache<CacheKey, V>) -> (String, CacheStats)
        where
            V: Send + Sync + 'static,
        {
            (cache.name().to_string(), cache.stats())
        }

        vec![
            entry(self.users.inner()),
            entry(self.score_rank.inner()),
            entry(self.check_in_rank.inner()),
            entry(self.tokens.inner()),
            entry(self.sys_config.inner()),
        ]
    }
}
