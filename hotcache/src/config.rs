//! Configuration for the cache, its services and background loops

use crate::error::{CacheError, Result};
use crate::ranking::RankingWeights;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Which store implementation backs the facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process keyspace
    #[default]
    Memory,
    /// Networked Redis server
    Redis,
}

impl FromStr for Backend {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "redis" => Ok(Backend::Redis),
            other => Err(CacheError::ConfigError(format!("unknown backend: {}", other))),
        }
    }
}

/// Connection settings for a remote store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Server URL, e.g. `redis://127.0.0.1:6379/0`
    pub url: Option<String>,

    /// Upper bound for a single command
    pub timeout: Duration,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Backoff before the first retry, doubled per attempt
    pub retry_delay: Duration,

    /// Backoff ceiling
    pub max_retry_delay: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_millis(500),
            max_retries: 3,
            retry_delay: Duration::from_millis(50),
            max_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Configuration for the cache facade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Store implementation
    pub backend: Backend,

    /// Remote store settings (used when `backend` is `Redis`)
    pub remote: RemoteConfig,

    /// Run the background TTL sweep
    pub enable_auto_sweep: bool,

    /// Interval between TTL sweeps
    pub sweep_interval: Duration,

    /// Sliding TTL for user sessions
    pub session_ttl: Duration,

    /// Maximum entries kept in a cached ranking
    pub ranking_capacity: usize,

    /// Interval between scheduled ranking refreshes; `None` disables the loop
    pub ranking_refresh_interval: Option<Duration>,

    /// Content types refreshed by the scheduled loop
    pub ranked_content_types: Vec<String>,

    /// Score weights for each engagement counter
    pub ranking_weights: RankingWeights,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            remote: RemoteConfig::default(),
            enable_auto_sweep: true,
            // Sweep every minute
            sweep_interval: Duration::from_secs(60),
            // 7 days
            session_ttl: Duration::from_secs(7 * 24 * 3600),
            ranking_capacity: 100,
            ranking_refresh_interval: None,
            ranked_content_types: Vec::new(),
            ranking_weights: RankingWeights::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(CacheError::ConfigError(
                "sweep_interval must be greater than 0".to_string(),
            ));
        }

        if self.session_ttl.is_zero() {
            return Err(CacheError::ConfigError(
                "session_ttl must be greater than 0".to_string(),
            ));
        }

        if self.ranking_capacity == 0 {
            return Err(CacheError::ConfigError(
                "ranking_capacity must be greater than 0".to_string(),
            ));
        }

        if matches!(self.ranking_refresh_interval, Some(interval) if interval.is_zero()) {
            return Err(CacheError::ConfigError(
                "ranking_refresh_interval must be greater than 0".to_string(),
            ));
        }

        if self.remote.timeout.is_zero() {
            return Err(CacheError::ConfigError(
                "remote timeout must be greater than 0".to_string(),
            ));
        }

        if self.backend == Backend::Redis && self.remote.url.is_none() {
            return Err(CacheError::ConfigError(
                "redis backend requires remote.url".to_string(),
            ));
        }

        self.ranking_weights.validate()
    }

    /// Load configuration from `HOTCACHE_*` environment variables.
    ///
    /// A `.env` file in the working directory is read first when present.
    /// Variables that are not set keep their default values.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(backend) = lookup("HOTCACHE_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(url) = lookup("HOTCACHE_REDIS_URL") {
            if lookup("HOTCACHE_BACKEND").is_none() {
                config.backend = Backend::Redis;
            }
            config.remote.url = Some(url);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "HOTCACHE_REDIS_TIMEOUT_MS")? {
            config.remote.timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "HOTCACHE_REDIS_MAX_RETRIES")? {
            config.remote.max_retries = retries;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "HOTCACHE_SWEEP_INTERVAL_SECS")? {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "HOTCACHE_SESSION_TTL_SECS")? {
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "HOTCACHE_RANKING_CAPACITY")? {
            config.ranking_capacity = capacity;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "HOTCACHE_RANKING_REFRESH_SECS")? {
            config.ranking_refresh_interval = Some(Duration::from_secs(secs));
        }
        if let Some(types) = lookup("HOTCACHE_RANKED_CONTENT_TYPES") {
            config.ranked_content_types = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| CacheError::ConfigError(format!("invalid value for {}: {}", name, raw))),
        None => Ok(None),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    backend: Option<Backend>,
    remote: Option<RemoteConfig>,
    enable_auto_sweep: Option<bool>,
    sweep_interval: Option<Duration>,
    session_ttl: Option<Duration>,
    ranking_capacity: Option<usize>,
    ranking_refresh_interval: Option<Duration>,
    ranked_content_types: Option<Vec<String>>,
    ranking_weights: Option<RankingWeights>,
}

impl CacheConfigBuilder {
    /// Select the store implementation
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use a Redis server at `url`
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        let mut remote = self.remote.take().unwrap_or_default();
        remote.url = Some(url.into());
        self.remote = Some(remote);
        self.backend = Some(Backend::Redis);
        self
    }

    /// Set remote store settings
    pub fn remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Enable or disable the background TTL sweep
    pub fn enable_auto_sweep(mut self, enable: bool) -> Self {
        self.enable_auto_sweep = Some(enable);
        self
    }

    /// Set the TTL sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Set the sliding session TTL
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    /// Set the number of entries kept per ranking
    pub fn ranking_capacity(mut self, capacity: usize) -> Self {
        self.ranking_capacity = Some(capacity);
        self
    }

    /// Refresh rankings on a fixed schedule
    pub fn ranking_refresh_interval(mut self, interval: Duration) -> Self {
        self.ranking_refresh_interval = Some(interval);
        self
    }

    /// Content types refreshed by the scheduled loop
    pub fn ranked_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ranked_content_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Set the ranking score weights
    pub fn ranking_weights(mut self, weights: RankingWeights) -> Self {
        self.ranking_weights = Some(weights);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            backend: self.backend.unwrap_or(defaults.backend),
            remote: self.remote.unwrap_or(defaults.remote),
            enable_auto_sweep: self.enable_auto_sweep.unwrap_or(defaults.enable_auto_sweep),
            sweep_interval: self.sweep_interval.unwrap_or(defaults.sweep_interval),
            session_ttl: self.session_ttl.unwrap_or(defaults.session_ttl),
            ranking_capacity: self.ranking_capacity.unwrap_or(defaults.ranking_capacity),
            ranking_refresh_interval: self
                .ranking_refresh_interval
                .or(defaults.ranking_refresh_interval),
            ranked_content_types: self
                .ranked_content_types
                .unwrap_or(defaults.ranked_content_types),
            ranking_weights: self.ranking_weights.unwrap_or(defaults.ranking_weights),
        }
    }
}

/// Preset configurations for common deployments
impl CacheConfig {
    /// In-process store with short intervals, for tests and local runs
    pub fn testing() -> Self {
        Self {
            sweep_interval: Duration::from_millis(100),
            session_ttl: Duration::from_secs(60),
            ranking_capacity: 10,
            ..Default::default()
        }
    }

    /// Redis-backed store refreshing the given content types every minute
    pub fn production(redis_url: impl Into<String>, content_types: &[&str]) -> Self {
        Self {
            backend: Backend::Redis,
            remote: RemoteConfig {
                url: Some(redis_url.into()),
                ..Default::default()
            },
            // The server expires keys itself; the sweep stays as a cheap no-op
            sweep_interval: Duration::from_secs(300),
            ranking_refresh_interval: Some(Duration::from_secs(60)),
            ranked_content_types: content_types.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.session_ttl, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.ranking_capacity, 100);
        assert!(config.enable_auto_sweep);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut invalid_config = CacheConfig::default();
        invalid_config.ranking_capacity = 0;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = CacheConfig::default();
        invalid_config.sweep_interval = Duration::ZERO;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = CacheConfig::default();
        invalid_config.backend = Backend::Redis;
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .session_ttl(Duration::from_secs(600))
            .ranking_capacity(5)
            .ranked_content_types(["work", "post"])
            .ranking_refresh_interval(Duration::from_secs(30))
            .build();

        assert_eq!(config.session_ttl, Duration::from_secs(600));
        assert_eq!(config.ranking_capacity, 5);
        assert_eq!(config.ranked_content_types, vec!["work", "post"]);
        assert_eq!(config.ranking_refresh_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_builder_redis_url_selects_backend() {
        let config = CacheConfig::builder()
            .redis_url("redis://127.0.0.1:6379")
            .build();

        assert_eq!(config.backend, Backend::Redis);
        assert_eq!(config.remote.url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("HOTCACHE_SESSION_TTL_SECS", "120"),
            ("HOTCACHE_RANKING_CAPACITY", "20"),
            ("HOTCACHE_RANKED_CONTENT_TYPES", "work, post,,"),
            ("HOTCACHE_RANKING_REFRESH_SECS", "15"),
        ]);

        let config =
            CacheConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.session_ttl, Duration::from_secs(120));
        assert_eq!(config.ranking_capacity, 20);
        assert_eq!(config.ranked_content_types, vec!["work", "post"]);
        assert_eq!(config.ranking_refresh_interval, Some(Duration::from_secs(15)));
        assert_eq!(config.backend, Backend::Memory);
    }

    #[test]
    fn test_from_lookup_redis_url_implies_backend() {
        let config = CacheConfig::from_lookup(|name| {
            (name == "HOTCACHE_REDIS_URL").then(|| "redis://localhost".to_string())
        })
        .unwrap();

        assert_eq!(config.backend, Backend::Redis);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = CacheConfig::from_lookup(|name| {
            (name == "HOTCACHE_SWEEP_INTERVAL_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(CacheError::ConfigError(_))));

        let result = CacheConfig::from_lookup(|name| {
            (name == "HOTCACHE_BACKEND").then(|| "memcached".to_string())
        });
        assert!(matches!(result, Err(CacheError::ConfigError(_))));
    }

    #[test]
    fn test_preset_configs() {
        let testing = CacheConfig::testing();
        assert_eq!(testing.backend, Backend::Memory);
        assert!(testing.validate().is_ok());

        let production = CacheConfig::production("redis://cache:6379", &["work"]);
        assert_eq!(production.backend, Backend::Redis);
        assert_eq!(production.ranked_content_types, vec!["work"]);
        assert!(production.validate().is_ok());
    }
}
