use std::sync::Arc;
use std::time::Duration;

use bbscache_core::{CacheKey, Result};
use bbscache_loading::{CachePolicy, LoadingCache};

use super::{or_none, source_cache};
use crate::model::User;
use crate::source::ForumSource;

/// Users by id.
#[derive(Clone)]
pub struct UserCache {
    cache: LoadingCache<CacheKey, User>,
}

impl UserCache {
    pub const NAME: &'static str = "user";

    pub fn default_policy() -> CachePolicy {
        CachePolicy::default()
            .with_max_entries(1000)
            .with_expire_after_access(Duration::from_secs(30 * 60))
    }

    pub fn new(source: &Arc<dyn ForumSource>, policy: CachePolicy) -> Result<Self> {
        let cache = source_cache(Self::NAME, policy, source, |source, key| async move {
            match key.as_i64() {
                Some(id) => source.user_by_id(id).await,
                None => Ok(None),
            }
        })?;
        Ok(Self { cache })
    }

    /// The user with `id`, or `None` for non-positive ids and unknown users.
    /// A failed load is logged and also reads as `None`.
    pub async fn get(&self, id: i64) -> Option<Arc<User>> {
        or_none(Self::NAME, id, self.try_get(id).await)
    }

    /// Like [`UserCache::get`] but reports source failures.
    pub async fn try_get(&self, id: i64) -> Result<Option<Arc<User>>> {
        if id <= 0 {
            return Ok(None);
        }
        self.cache.get(&CacheKey::from(id)).await
    }

    pub fn invalidate(&self, id: i64) {
        self.cache.invalidate(&CacheKey::from(id));
    }

    pub fn inner(&self) -> &LoadingCache<CacheKey, User> {
        &self.cache
    }
}
