//! Strikewatch Market Data Crate
//!
//! Quota-aware access to a brokerage market-data API for collecting
//! near-the-money index option quotes on a polling cadence.
//!
//! # Overview
//!
//! The crate supports:
//! - Priority-tiered rate limiting with exponential backoff on throttling
//! - A short-lived response cache keyed by request fingerprint
//! - Retry-once on provider throttling, no retry on other failures
//! - Batched collection with a quality threshold and an overall deadline
//! - ATM option chain derivation for NSE indices
//!
//! # Architecture
//!
//! ```text
//!                          +----------------------+
//!                          | OptionChainCollector |  (per-index cycle, polling)
//!                          +----------------------+
//!                                     |
//!                                     v
//!                          +----------------------+
//!                          |    BatchScheduler    |  (batches, workers, deadline)
//!                          +----------------------+
//!                                     |
//!                                     v
//! +---------------+        +----------------------+        +-----------------+
//! | ResponseCache | <----> |    ProviderClient    | <----> | MetricsRegistry |
//! +---------------+        +----------------------+        +-----------------+
//!                                     |
//!                                     v
//!                          +----------------------+
//!                          | PriorityRateLimiter  |  (window, tiers, backoff)
//!                          +----------------------+
//!                                     |
//!                                     v
//!                          +----------------------+
//!                          |    BrokerProvider    |  (external collaborator)
//!                          +----------------------+
//! ```
//!
//! # Core Types
//!
//! - [`CollectorConfig`] - All tunables, from defaults, `SW_*` env vars or JSON
//! - [`ProviderClient`] - One logical provider call: cache, limiter, retry, metrics
//! - [`BatchScheduler`] - `collect(ids, priority) -> CollectionResult`
//! - [`OptionChainCollector`] - ATM chain collection and the polling loop
//! - [`CollectionResult`] - Terminal per-collection artifact
//! - [`BrokerProvider`] - Trait implemented by concrete brokerage clients

pub mod chain;
pub mod collector;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod provider;
pub mod scheduler;

// Re-export configuration
pub use config::{
    BatchMode, CacheConfig, ClientConfig, CollectorConfig, RateLimitConfig, SchedulerConfig,
};

// Re-export error types
pub use errors::{ConfigError, ErrorKind, MarketDataError, ProviderFault, RetryClass};

// Re-export all public types from models
pub use models::{
    CollectionResult, FailureReason, InstrumentKey, InstrumentMeta, InstrumentOutcome,
    OptionQuote, ProviderCallOutcome, ProviderMethod, ProviderRequest, ProviderResponse,
    RequestPriority,
};

// Re-export gateway types
pub use gateway::{
    CacheKey, HealthReport, HealthStatus, MetricsRegistry, PriorityRateLimiter, ProviderClient,
    ProviderStats, QuoteValidator, ResponseCache,
};

// Re-export provider types
pub use provider::{classify_message, classify_status, BrokerProvider};

// Re-export collection types
pub use chain::{IndexRegistry, IndexSpec, OptionContract, OptionSide};
pub use collector::{CollectionMetrics, CollectionSink, OptionChainCollector};
pub use scheduler::{BatchScheduler, InstrumentBatch};
