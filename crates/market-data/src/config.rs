//! Collector configuration.
//!
//! A single explicit struct covers the limiter, cache, client and scheduler.
//! It can be built from defaults, from `SW_*` environment variables, or from
//! JSON, and is split into per-component views before use.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// How the scheduler runs batches once a request spans more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Concurrent for HIGH/CRITICAL requests, sequential otherwise.
    #[default]
    Auto,
    Sequential,
    Concurrent,
}

impl FromStr for BatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BatchMode::Auto),
            "sequential" => Ok(BatchMode::Sequential),
            "concurrent" => Ok(BatchMode::Concurrent),
            other => Err(format!("unknown batch mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectorConfig {
    pub requests_per_minute: u32,
    /// Requests per window that may skip the minimum-spacing check.
    pub burst_allowance: u32,
    pub max_concurrent: usize,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub batch_mode: BatchMode,
    pub cache_enabled: bool,
    pub cache_ttl_seconds: u64,
    pub max_cache_entries: usize,
    pub quality_threshold: f64,
    /// Per-call limiter wait budget.
    pub max_wait_seconds: u64,
    /// Overall bound on a single `collect`.
    pub collection_timeout_seconds: u64,
    /// Upper bound on the pause before the throttle retry.
    pub retry_delay_cap_ms: u64,
    /// A success older than this makes the client report "degraded".
    pub health_freshness_seconds: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 180,
            burst_allowance: 0,
            max_concurrent: 4,
            batch_size: 25,
            batch_delay_ms: 100,
            batch_mode: BatchMode::Auto,
            cache_enabled: true,
            cache_ttl_seconds: 5,
            max_cache_entries: 1000,
            quality_threshold: 0.8,
            max_wait_seconds: 60,
            collection_timeout_seconds: 30,
            retry_delay_cap_ms: 2000,
            health_freshness_seconds: 300,
        }
    }
}

impl CollectorConfig {
    /// Load configuration from `SW_*` environment variables.
    ///
    /// Unset variables fall back to defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Parse configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            requests_per_minute: env_or(
                &lookup,
                "SW_REQUESTS_PER_MINUTE",
                defaults.requests_per_minute,
            )?,
            burst_allowance: env_or(&lookup, "SW_BURST_ALLOWANCE", defaults.burst_allowance)?,
            max_concurrent: env_or(&lookup, "SW_MAX_CONCURRENT", defaults.max_concurrent)?,
            batch_size: env_or(&lookup, "SW_BATCH_SIZE", defaults.batch_size)?,
            batch_delay_ms: env_or(&lookup, "SW_BATCH_DELAY_MS", defaults.batch_delay_ms)?,
            batch_mode: env_or(&lookup, "SW_BATCH_MODE", defaults.batch_mode)?,
            cache_enabled: env_or(&lookup, "SW_CACHE_ENABLED", defaults.cache_enabled)?,
            cache_ttl_seconds: env_or(&lookup, "SW_CACHE_TTL_SECONDS", defaults.cache_ttl_seconds)?,
            max_cache_entries: env_or(&lookup, "SW_MAX_CACHE_ENTRIES", defaults.max_cache_entries)?,
            quality_threshold: env_or(&lookup, "SW_QUALITY_THRESHOLD", defaults.quality_threshold)?,
            max_wait_seconds: env_or(&lookup, "SW_MAX_WAIT_SECONDS", defaults.max_wait_seconds)?,
            collection_timeout_seconds: env_or(
                &lookup,
                "SW_COLLECTION_TIMEOUT_SECONDS",
                defaults.collection_timeout_seconds,
            )?,
            retry_delay_cap_ms: env_or(
                &lookup,
                "SW_RETRY_DELAY_CAP_MS",
                defaults.retry_delay_cap_ms,
            )?,
            health_freshness_seconds: env_or(
                &lookup,
                "SW_HEALTH_FRESHNESS_SECONDS",
                defaults.health_freshness_seconds,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requests_per_minute == 0 {
            return Err(invalid("requests_per_minute", "must be greater than zero"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be greater than zero"));
        }
        if self.max_concurrent == 0 {
            return Err(invalid("max_concurrent", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(invalid("quality_threshold", "must be within [0, 1]"));
        }
        if self.cache_enabled && self.max_cache_entries == 0 {
            return Err(invalid(
                "max_cache_entries",
                "must be greater than zero when the cache is enabled",
            ));
        }
        Ok(())
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: self.requests_per_minute,
            burst_allowance: self.burst_allowance,
        }
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.cache_enabled,
            default_ttl: Duration::from_secs(self.cache_ttl_seconds),
            max_entries: self.max_cache_entries,
        }
    }

    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            max_wait: Duration::from_secs(self.max_wait_seconds),
            retry_delay_cap: Duration::from_millis(self.retry_delay_cap_ms),
            health_freshness: Duration::from_secs(self.health_freshness_seconds),
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            max_workers: self.max_concurrent,
            mode: self.batch_mode,
            quality_threshold: self.quality_threshold,
            collection_timeout: Duration::from_secs(self.collection_timeout_seconds),
        }
    }
}

fn env_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Env {
            var: var.to_string(),
            value,
        }),
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

/// Limiter settings.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitConfig {
    /// Global per-minute request budget.
    pub requests_per_minute: u32,
    /// Requests per window allowed to bypass minimum spacing.
    pub burst_allowance: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        CollectorConfig::default().rate_limit()
    }
}

/// Response cache settings.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub default_ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CollectorConfig::default().cache()
    }
}

/// Provider client settings.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// How long a single call may wait for a limiter slot.
    pub max_wait: Duration,
    /// Cap on the pause before the throttle retry.
    pub retry_delay_cap: Duration,
    /// Freshness window for the "healthy" status.
    pub health_freshness: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        CollectorConfig::default().client()
    }
}

/// Batch scheduler settings.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_workers: usize,
    pub mode: BatchMode,
    pub quality_threshold: f64,
    pub collection_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        CollectorConfig::default().scheduler()
    }
}
