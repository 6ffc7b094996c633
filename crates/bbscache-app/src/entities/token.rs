use std::sync::Arc;
use std::time::Duration;

use bbscache_core::{CacheKey, Result};
use bbscache_loading::{CachePolicy, LoadingCache};

use super::{or_none, source_cache};
use crate::model::{UserToken, now_millis};
use crate::source::ForumSource;

/// Session tokens.
///
/// Tokens are cached as stored; validity is checked on every read so an
/// expiring token stops authenticating without an invalidation.
#[derive(Clone)]
pub struct UserTokenCache {
    cache: LoadingCache<CacheKey, UserToken>,
}

impl UserTokenCache {
    pub const NAME: &'static str = "user_token";

    pub fn default_policy() -> CachePolicy {
        CachePolicy::default()
            .with_max_entries(1000)
            .with_expire_after_access(Duration::from_secs(60 * 60))
    }

    pub fn new(source: &Arc<dyn ForumSource>, policy: CachePolicy) -> Result<Self> {
        let cache = source_cache(Self::NAME, policy, source, |source, key| async move {
            source.user_token(key.as_str()).await
        })?;
        Ok(Self { cache })
    }

    /// The token if it is active and not expired.
    pub async fn get(&self, token: &str) -> Option<Arc<UserToken>> {
        or_none(Self::NAME, token, self.try_get(token).await)
    }

    /// Like [`UserTokenCache::get`] but reports source failures.
    pub async fn try_get(&self, token: &str) -> Result<Option<Arc<UserToken>>> {
        if token.is_empty() {
            return Ok(None);
        }
        let found = self.cache.get(&CacheKey::new(token)).await?;
        let now_ms = now_millis();
        Ok(found.filter(|t| t.is_valid_at(now_ms)))
    }

    pub fn invalidate(&self, token: &str) {
        self.cache.invalidate(&CacheKey::new(token));
    }

    pub fn inner(&self) -> &LoadingCache<CacheKey, UserToken> {
        &self.cache
    }
}
