use std::time::Duration;

use bbscache_loading::CachePolicy;
use bbscache_store::RedisStoreConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[source] config::ConfigError),
    #[error("config deserialize error: {0}")]
    Deserialize(#[source] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Remote tier. Disabled or unreachable Redis falls back to memory.
    #[serde(default)]
    pub redis: RedisStoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Redis validations
        if self.redis.enabled && self.redis.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "redis.enabled=true requires redis.url".into(),
            ));
        }
        if self.redis.pool_size == 0 {
            return Err(ConfigError::Invalid("redis.pool_size must be > 0".into()));
        }
        if self.redis.timeout_ms == 0 {
            return Err(ConfigError::Invalid("redis.timeout_ms must be > 0".into()));
        }
        if self.redis.key_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "redis.key_prefix must not be empty".into(),
            ));
        }
        // Cache validations
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.cache.rank_refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.rank_refresh_interval_secs must be > 0".into(),
            ));
        }
        for (name, entity) in self.cache.entities() {
            entity
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("cache.{name}: {e}")))?;
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub user: EntityCacheConfig,
    #[serde(default)]
    pub user_token: EntityCacheConfig,
    #[serde(default)]
    pub sys_config: EntityCacheConfig,
    #[serde(default)]
    pub score_rank: EntityCacheConfig,
    #[serde(default)]
    pub check_in_rank: EntityCacheConfig,

    /// How often expired entries are swept out of every cache
    /// Default: 60 seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// How often the score and check-in rankings are reloaded
    /// Default: 600 seconds (10 minutes)
    #[serde(default = "default_rank_refresh_interval_secs")]
    pub rank_refresh_interval_secs: u64,

    /// TTL for cache-aside writes to the remote store, 0 keeps values forever
    /// Default: 3600 seconds (1 hour)
    #[serde(default = "default_remote_ttl_secs")]
    pub default_remote_ttl_secs: u64,

    /// Serve from the source without write-back when the remote store fails
    /// Default: false
    #[serde(default)]
    pub degrade_to_source: bool,
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_rank_refresh_interval_secs() -> u64 {
    600
}

fn default_remote_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            user: EntityCacheConfig::default(),
            user_token: EntityCacheConfig::default(),
            sys_config: EntityCacheConfig::default(),
            score_rank: EntityCacheConfig::default(),
            check_in_rank: EntityCacheConfig::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
            rank_refresh_interval_secs: default_rank_refresh_interval_secs(),
            default_remote_ttl_secs: default_remote_ttl_secs(),
            degrade_to_source: false,
        }
    }
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn rank_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.rank_refresh_interval_secs)
    }

    pub fn default_remote_ttl(&self) -> Duration {
        Duration::from_secs(self.default_remote_ttl_secs)
    }

    fn entities(&self) -> [(&'static str, &EntityCacheConfig); 5] {
        [
            ("user", &self.user),
            ("user_token", &self.user_token),
            ("sys_config", &self.sys_config),
            ("score_rank", &self.score_rank),
            ("check_in_rank", &self.check_in_rank),
        ]
    }
}

/// Overrides for one entity cache. Unset fields keep the entity's own bound.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntityCacheConfig {
    #[serde(default)]
    pub max_entries: Option<usize>,
    #[serde(default)]
    pub expire_after_access_secs: Option<u64>,
    #[serde(default)]
    pub refresh_after_write_secs: Option<u64>,
}

impl EntityCacheConfig {
    /// Apply these overrides on top of `base`.
    pub fn policy(&self, base: CachePolicy) -> CachePolicy {
        let mut policy = base;
        if let Some(max) = self.max_entries {
            policy = policy.with_max_entries(max);
        }
        if let Some(secs) = self.expire_after_access_secs {
            policy = policy.with_expire_after_access(Duration::from_secs(secs));
        }
        if let Some(secs) = self.refresh_after_write_secs {
            policy = policy.with_refresh_after_write(Duration::from_secs(secs));
        }
        policy
    }

    fn validate(&self) -> Result<(), String> {
        self.policy(CachePolicy::unbounded())
            .validate()
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{AppConfig, ConfigError};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Config file read when no path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "bbscache.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
        load_dotenv();

        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., BBSCACHE__REDIS__URL=redis://cache:6379
        builder = builder.add_source(
            Environment::with_prefix("BBSCACHE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder.build().map_err(ConfigError::Build)?;
        let merged: AppConfig = cfg.try_deserialize().map_err(ConfigError::Deserialize)?;
        merged.validate()?;
        Ok(merged)
    }

    /// Load `.env` when present. A missing file is not an error.
    fn load_dotenv() {
        if let Err(e) = dotenvy::dotenv() {
            if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
            {
                tracing::warn!(error = %e, "Failed to load .env file");
            }
        }
    }
}
