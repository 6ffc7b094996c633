//! Post-commit invalidation entry points.
//!
//! Writers call these only after their transaction committed, so a reader
//! can never reload the old row into a cache after it was invalidated.

use std::future::Future;
use std::sync::Arc;

use bbscache_store::RemoteStore;
use tracing::{debug, warn};

use crate::entities::ForumCaches;

/// A cache change caused by a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    User(i64),
    Token(String),
    SysConfig(String),
    /// Reload the score ranking.
    ScoreRank,
    /// Reload the check-in ranking of a day (`YYYYMMDD`).
    CheckInRank(i64),
    /// Delete a cache-aside entry from the remote store.
    Remote(String),
}

#[derive(Clone)]
pub struct CacheHooks {
    caches: ForumCaches,
    remote: Option<Arc<dyn RemoteStore>>,
}

impl CacheHooks {
    pub fn new(caches: ForumCaches) -> Self {
        Self {
            caches,
            remote: None,
        }
    }

    /// Also delete remote cache-aside entries on [`Invalidation::Remote`].
    pub fn with_remote(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(store);
        self
    }

    pub fn caches(&self) -> &ForumCaches {
        &self.caches
    }

    /// Apply one invalidation. Ranking refreshes reload eagerly.
    pub async fn apply(&self, invalidation: Invalidation) {
        debug!(?invalidation, "Applying cache invalidation");
        match invalidation {
            Invalidation::User(id) => self.caches.users.invalidate(id),
            Invalidation::Token(token) => self.caches.tokens.invalidate(&token),
            Invalidation::SysConfig(key) => self.caches.sys_config.invalidate(&key),
            Invalidation::ScoreRank => {
                self.caches.score_rank.refresh().await;
            }
            Invalidation::CheckInRank(day) => {
                self.caches.check_in_rank.refresh(day).await;
            }
            Invalidation::Remote(key) => {
                if let Some(store) = &self.remote {
                    if let Err(e) = store.delete(&key).await {
                        warn!(key = %key, error = %e, "Failed to delete remote cache entry");
                    }
                }
            }
        }
    }

    /// Await `write` and apply `invalidations` only if it succeeded.
    ///
    /// A failed write leaves every cache untouched and returns its error.
    pub async fn commit_then<T, E, Fut, I>(&self, write: Fut, invalidations: I) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        I: IntoIterator<Item = Invalidation>,
    {
        let value = write.await?;
        for invalidation in invalidations {
            self.apply(invalidation).await;
        }
        Ok(value)
    }

    pub async fn user_updated(&self, id: i64) {
        self.apply(Invalidation::User(id)).await;
    }

    pub async fn token_revoked(&self, token: &str) {
        self.apply(Invalidation::Token(token.to_string())).await;
    }

    pub async fn sys_config_changed(&self, key: &str) {
        self.apply(Invalidation::SysConfig(key.to_string())).await;
    }

    pub async fn score_changed(&self) {
        self.apply(Invalidation::ScoreRank).await;
    }

    pub async fn check_in_recorded(&self, day: i64) {
        self.apply(Invalidation::CheckInRank(day)).await;
    }
}
