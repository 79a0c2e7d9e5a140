//! Request metrics and the derived health model.
//!
//! The registry is shared by every call made through a
//! [`ProviderClient`](super::ProviderClient). Counters are in-memory only
//! and reset when the client is dropped.
//!
//! Health scoring:
//!
//! | Condition                   | Effect on score                         |
//! |-----------------------------|-----------------------------------------|
//! | N consecutive failures      | `× max(0.1, 1 - 0.1·N)`                 |
//! | success rate below 0.9      | `× success_rate`                        |
//!
//! The result is clamped to `[0, 1]`. Status is healthy when the score is
//! above 0.7 and the last success is within the freshness window.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::warn;
use serde::Serialize;
use tokio::time::Instant;

/// Score above which a provider may be reported healthy.
pub const HEALTHY_SCORE: f64 = 0.7;

const SUCCESS_RATE_FLOOR: f64 = 0.9;
const FAILURE_PENALTY: f64 = 0.1;
const MIN_FAILURE_FACTOR: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Sum of latencies of successful requests.
    pub total_latency: Duration,
    pub consecutive_failures: u32,
    pub last_success: Option<Instant>,
}

impl Metrics {
    /// successful / total, or 0 before any request.
    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_requests, self.total_requests)
    }

    /// Mean latency over successful requests.
    pub fn average_latency(&self) -> Duration {
        if self.successful_requests == 0 {
            return Duration::ZERO;
        }
        self.total_latency.div_f64(self.successful_requests as f64)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.cache_hits + self.cache_misses)
    }

    pub fn health_score(&self) -> f64 {
        let mut score = 1.0;
        if self.consecutive_failures > 0 {
            let factor = 1.0 - FAILURE_PENALTY * f64::from(self.consecutive_failures);
            score *= factor.max(MIN_FAILURE_FACTOR);
        }
        // No traffic yet is not a penalty.
        if self.total_requests > 0 && self.success_rate() < SUCCESS_RATE_FLOOR {
            score *= self.success_rate();
        }
        score.clamp(0.0, 1.0)
    }

    /// Healthy only with a good score and a success inside `freshness`.
    pub fn status(&self, freshness: Duration) -> HealthStatus {
        let fresh = self
            .last_success
            .map(|at| at.elapsed() < freshness)
            .unwrap_or(false);
        if fresh && self.health_score() > HEALTHY_SCORE {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Thread-safe metrics accumulator.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    inner: Mutex<Metrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> MutexGuard<'_, Metrics> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Metrics mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Record the outcome of one provider call.
    ///
    /// A cache hit never reached the provider, so it only bumps the hit
    /// counter and leaves request totals alone.
    pub fn record_request(
        &self,
        success: bool,
        latency: Duration,
        rate_limited: bool,
        cache_hit: bool,
    ) {
        let mut m = self.lock_inner();
        if cache_hit {
            m.cache_hits += 1;
            return;
        }

        m.total_requests += 1;
        if success {
            m.successful_requests += 1;
            m.total_latency += latency;
            m.consecutive_failures = 0;
            m.last_success = Some(Instant::now());
        } else {
            m.failed_requests += 1;
            m.consecutive_failures = m.consecutive_failures.saturating_add(1);
        }
        if rate_limited {
            m.rate_limited_requests += 1;
        }
    }

    pub fn record_cache_miss(&self) {
        self.lock_inner().cache_misses += 1;
    }

    pub fn snapshot(&self) -> Metrics {
        self.lock_inner().clone()
    }

    pub fn reset(&self) {
        *self.lock_inner() = Metrics::default();
    }
}

/// `getStats` payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub provider: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub cache_hit_rate: f64,
    pub rate_limited_count: u64,
    pub consecutive_failures: u32,
    pub requests_per_minute: u32,
    pub max_concurrent: usize,
    pub batch_size: usize,
    pub cache_ttl_seconds: u64,
}

/// `checkHealth` payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub health_score: f64,
    pub backoff_remaining_seconds: f64,
    pub consecutive_throttles: u32,
    pub current_window_count: u32,
    pub cache_enabled: bool,
    pub cache_size: usize,
    pub cache_max_size: usize,
}
