//! Leaderboards: the score ranking and the daily check-in ranking.

use std::sync::Arc;
use std::time::Duration;

use bbscache_core::{CacheKey, Result, day_bucket};
use bbscache_loading::{CachePolicy, LoadingCache};
use time::OffsetDateTime;

use super::{or_none, source_cache};
use crate::model::{CheckIn, User};
use crate::source::ForumSource;

/// Number of users in the score ranking.
pub const SCORE_RANK_SIZE: usize = 10;

/// Number of check-ins listed per day.
pub const CHECK_IN_RANK_SIZE: usize = 10;

/// An empty ranking is a miss, so the next read asks the source again.
fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

/// Top users by score, stored under a single key.
#[derive(Clone)]
pub struct ScoreRankCache {
    cache: LoadingCache<CacheKey, Vec<User>>,
}

impl ScoreRankCache {
    pub const NAME: &'static str = "score_rank";
    /// The only key this cache holds.
    pub const KEY: &'static str = "data";

    pub fn default_policy() -> CachePolicy {
        CachePolicy::default()
            .with_max_entries(10)
            .with_refresh_after_write(Duration::from_secs(10 * 60))
    }

    pub fn new(source: &Arc<dyn ForumSource>, policy: CachePolicy) -> Result<Self> {
        let cache = source_cache(Self::NAME, policy, source, |source, _key| async move {
            source.users_by_score(SCORE_RANK_SIZE).await.map(non_empty)
        })?;
        Ok(Self { cache })
    }

    pub async fn get(&self) -> Option<Arc<Vec<User>>> {
        or_none(Self::NAME, Self::KEY, self.try_get().await)
    }

    pub async fn try_get(&self) -> Result<Option<Arc<Vec<User>>>> {
        self.cache.get(&CacheKey::new(Self::KEY)).await
    }

    /// Reload the ranking now, replacing the cached one on success.
    pub async fn refresh(&self) -> Option<Arc<Vec<User>>> {
        let result = self.cache.refresh(&CacheKey::new(Self::KEY)).await;
        or_none(Self::NAME, Self::KEY, result)
    }

    pub fn inner(&self) -> &LoadingCache<CacheKey, Vec<User>> {
        &self.cache
    }
}

/// Check-in ranking per day, keyed by the `YYYYMMDD` day bucket.
#[derive(Clone)]
pub struct CheckInRankCache {
    cache: LoadingCache<CacheKey, Vec<CheckIn>>,
}

impl CheckInRankCache {
    pub const NAME: &'static str = "check_in_rank";

    pub fn default_policy() -> CachePolicy {
        CachePolicy::default()
            .with_max_entries(7)
            .with_refresh_after_write(Duration::from_secs(10 * 60))
    }

    pub fn new(source: &Arc<dyn ForumSource>, policy: CachePolicy) -> Result<Self> {
        let cache = source_cache(Self::NAME, policy, source, |source, key| async move {
            match key.as_i64() {
                Some(day) => source
                    .check_in_rank(day, CHECK_IN_RANK_SIZE)
                    .await
                    .map(non_empty),
                None => Ok(None),
            }
        })?;
        Ok(Self { cache })
    }

    pub async fn get(&self, day: i64) -> Option<Arc<Vec<CheckIn>>> {
        or_none(Self::NAME, day, self.try_get(day).await)
    }

    pub async fn try_get(&self, day: i64) -> Result<Option<Arc<Vec<CheckIn>>>> {
        self.cache.get(&CacheKey::from(day)).await
    }

    pub async fn refresh(&self, day: i64) -> Option<Arc<Vec<CheckIn>>> {
        let result = self.cache.refresh(&CacheKey::from(day)).await;
        or_none(Self::NAME, day, result)
    }

    /// Refresh the ranking of the current UTC day.
    pub async fn refresh_today(&self) -> Option<Arc<Vec<CheckIn>>> {
        self.refresh(day_bucket(OffsetDateTime::now_utc())).await
    }

    pub fn inner(&self) -> &LoadingCache<CacheKey, Vec<CheckIn>> {
        &self.cache
    }
}
