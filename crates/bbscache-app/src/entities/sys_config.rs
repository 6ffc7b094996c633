use std::sync::Arc;
use std::time::Duration;

use bbscache_core::{CacheKey, Result};
use bbscache_loading::{CachePolicy, LoadingCache};

use super::{or_none, source_cache};
use crate::model::{DEFAULT_TOKEN_EXPIRE_DAYS, sys_config_keys};
use crate::source::ForumSource;

/// Values of the `sys_config` table.
#[derive(Clone)]
pub struct SysConfigCache {
    cache: LoadingCache<CacheKey, String>,
}

impl SysConfigCache {
    pub const NAME: &'static str = "sys_config";

    pub fn default_policy() -> CachePolicy {
        CachePolicy::default()
            .with_max_entries(100)
            .with_expire_after_access(Duration::from_secs(30 * 60))
    }

    pub fn new(source: &Arc<dyn ForumSource>, policy: CachePolicy) -> Result<Self> {
        let cache = source_cache(Self::NAME, policy, source, |source, key| async move {
            source.sys_config(key.as_str()).await
        })?;
        Ok(Self { cache })
    }

    pub async fn get_value(&self, key: &str) -> Option<Arc<String>> {
        or_none(Self::NAME, key, self.try_get_value(key).await)
    }

    pub async fn try_get_value(&self, key: &str) -> Result<Option<Arc<String>>> {
        self.cache.get(&CacheKey::new(key)).await
    }

    /// Login token lifetime in days.
    ///
    /// Missing, unparsable and non-positive values yield
    /// [`DEFAULT_TOKEN_EXPIRE_DAYS`].
    pub async fn token_expire_days(&self) -> i64 {
        self.get_value(sys_config_keys::TOKEN_EXPIRE_DAYS)
            .await
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_TOKEN_EXPIRE_DAYS)
    }

    /// Whether new articles wait for moderation. Anything but `"true"` is off.
    pub async fn article_pending(&self) -> bool {
        self.get_value(sys_config_keys::ARTICLE_PENDING)
            .await
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(&CacheKey::new(key));
    }

    pub fn inner(&self) -> &LoadingCache<CacheKey, String> {
        &self.cache
    }
}
