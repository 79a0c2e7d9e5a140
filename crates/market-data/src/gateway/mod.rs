//! Provider gateway.
//!
//! - `rate_limiter` - Priority-tiered admission control with throttle backoff
//! - `cache` - Bounded TTL response cache keyed by request fingerprint
//! - `metrics` - Request counters and the health model
//! - `validator` - Record-level quote checks
//! - `client` - The `ProviderClient` tying them together

mod cache;
mod client;
mod metrics;
mod rate_limiter;
mod validator;

pub use cache::{CacheKey, CacheStats, ResponseCache};
pub use client::ProviderClient;
pub use metrics::{
    HealthReport, HealthStatus, Metrics, MetricsRegistry, ProviderStats, HEALTHY_SCORE,
};
pub use rate_limiter::{DenyReason, PriorityRateLimiter, RateWindowSnapshot, WINDOW};
pub use validator::{QuoteValidator, ValidationIssue, ValidationSeverity, ValidatorConfig};
