//! Provider client.
//!
//! Every outbound call goes through [`ProviderClient::call`]:
//!
//! ```text
//! request ─► cache ──hit──► value
//!              │ miss
//!              ▼
//!          limiter.await_acquire ──timeout──► RateLimitTimeout
//!              │
//!              ▼
//!          provider ──ok──► cache.put ─► value
//!              │ throttled
//!              ▼
//!          report_throttled, short sleep, one more pass ─► value | error
//! ```
//!
//! Other failures surface immediately. Every attempt is recorded in the
//! shared [`MetricsRegistry`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use tokio::time::{sleep, Instant};

use super::cache::{CacheKey, ResponseCache};
use super::metrics::{HealthReport, MetricsRegistry, ProviderStats};
use super::rate_limiter::PriorityRateLimiter;
use super::validator::QuoteValidator;
use crate::chain::{atm_strike, IndexSpec};
use crate::config::{ClientConfig, CollectorConfig};
use crate::errors::{MarketDataError, RetryClass};
use crate::models::{
    InstrumentKey, InstrumentMeta, OptionQuote, ProviderCallOutcome, ProviderRequest,
    ProviderResponse, RequestPriority,
};
use crate::provider::BrokerProvider;

/// Gateway to a single brokerage provider.
///
/// Owns the limiter, cache and metrics for that provider. Share it behind an
/// `Arc`; all methods take `&self`.
pub struct ProviderClient {
    provider: Arc<dyn BrokerProvider>,
    limiter: PriorityRateLimiter,
    cache: ResponseCache<ProviderResponse>,
    metrics: MetricsRegistry,
    validator: QuoteValidator,
    config: ClientConfig,
    settings: CollectorConfig,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn BrokerProvider>, settings: &CollectorConfig) -> Self {
        info!(
            "Provider client for {}: {} req/min, cache {} (ttl {}s, max {})",
            provider.id(),
            settings.requests_per_minute,
            if settings.cache_enabled { "on" } else { "off" },
            settings.cache_ttl_seconds,
            settings.max_cache_entries
        );
        if let Err(e) = settings.validate() {
            warn!("Provider client for {}: {}", provider.id(), e);
        }
        Self {
            limiter: PriorityRateLimiter::new(settings.rate_limit()),
            cache: ResponseCache::new(settings.cache()),
            metrics: MetricsRegistry::new(),
            validator: QuoteValidator::new(),
            config: settings.client(),
            settings: settings.clone(),
            provider,
        }
    }

    pub fn provider_id(&self) -> &'static str {
        self.provider.id()
    }

    pub fn limiter(&self) -> &PriorityRateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &ResponseCache<ProviderResponse> {
        &self.cache
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn settings(&self) -> &CollectorConfig {
        &self.settings
    }

    /// Execute one logical provider call.
    ///
    /// `ttl` overrides the cache's default TTL for the stored response.
    pub async fn call(
        &self,
        request: ProviderRequest,
        priority: RequestPriority,
        ttl: Option<Duration>,
    ) -> Result<ProviderResponse, MarketDataError> {
        request.validate()?;
        let key = CacheKey::for_request(&request);
        let started = Instant::now();

        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }

        let error = match self.attempt(&request, priority).await.into_result() {
            Ok(value) => {
                self.limiter.report_success();
                self.cache.put(key, value.clone(), ttl);
                return Ok(value);
            }
            Err(e) => e,
        };

        if error.retry_class() != RetryClass::RetryOnceAfterBackoff {
            error!("{}: {} request failed: {}", self.provider.id(), request.method(), error);
            return Err(error);
        }

        let backoff = self.limiter.report_throttled();
        let delay = (started.elapsed() * 2).min(self.config.retry_delay_cap);
        info!(
            "{}: {} throttled, retrying once in {:?} (backoff {:?})",
            self.provider.id(),
            request.method(),
            delay,
            backoff
        );
        sleep(delay).await;

        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }

        // A success here is not a clean success: the throttle streak stays
        // until a first attempt goes through.
        match self.attempt(&request, priority).await.into_result() {
            Ok(value) => {
                self.cache.put(key, value.clone(), ttl);
                Ok(value)
            }
            Err(e) => {
                if e.retry_class() == RetryClass::RetryOnceAfterBackoff {
                    self.limiter.report_throttled();
                }
                error!(
                    "{}: {} retry failed: {}",
                    self.provider.id(),
                    request.method(),
                    e
                );
                Err(e)
            }
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<ProviderResponse> {
        if !self.cache.is_enabled() {
            return None;
        }
        match self.cache.get(key) {
            Some(hit) => {
                self.metrics.record_request(true, Duration::ZERO, false, true);
                debug!("{}: cache hit {}", self.provider.id(), key);
                Some(hit)
            }
            None => {
                self.metrics.record_cache_miss();
                None
            }
        }
    }

    /// Admission plus a single provider invocation.
    async fn attempt(
        &self,
        request: &ProviderRequest,
        priority: RequestPriority,
    ) -> ProviderCallOutcome {
        let outcome = match self
            .limiter
            .await_acquire(priority, self.config.max_wait)
            .await
        {
            Err(e) => ProviderCallOutcome::failed(e, Duration::ZERO),
            Ok(()) => {
                let started = Instant::now();
                let result = self.invoke(request).await;
                let latency = started.elapsed();
                match result {
                    Ok(value) => ProviderCallOutcome::succeeded(value, latency),
                    Err(e) => {
                        warn!(
                            "{}: {} failed after {:?}: {}",
                            self.provider.id(),
                            request.method(),
                            latency,
                            e
                        );
                        ProviderCallOutcome::failed(e, latency)
                    }
                }
            }
        };

        self.metrics.record_request(
            outcome.success,
            outcome.latency,
            outcome.is_rate_limited(),
            false,
        );
        outcome
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse, MarketDataError> {
        let provider = self.provider.id();
        let result = match request {
            ProviderRequest::Quote(ids) => {
                self.provider.quote(ids).await.map(ProviderResponse::Quotes)
            }
            ProviderRequest::Ltp(ids) => self.provider.ltp(ids).await.map(ProviderResponse::Ltp),
            ProviderRequest::Instruments(exchange) => self
                .provider
                .instruments(exchange.trim())
                .await
                .map(ProviderResponse::Instruments),
        };
        result.map_err(|fault| MarketDataError::from_fault(provider, fault))
    }

    /// Full quotes for `ids`.
    pub async fn quote(
        &self,
        ids: &[InstrumentKey],
        priority: RequestPriority,
    ) -> Result<HashMap<InstrumentKey, OptionQuote>, MarketDataError> {
        self.call(ProviderRequest::Quote(ids.to_vec()), priority, None)
            .await?
            .into_quotes()
    }

    /// Last traded prices for `ids`.
    pub async fn ltp(
        &self,
        ids: &[InstrumentKey],
        priority: RequestPriority,
    ) -> Result<HashMap<InstrumentKey, Decimal>, MarketDataError> {
        self.call(ProviderRequest::Ltp(ids.to_vec()), priority, None)
            .await?
            .into_ltp()
    }

    /// Instrument master for `exchange`.
    pub async fn instruments(
        &self,
        exchange: &str,
        priority: RequestPriority,
        ttl: Option<Duration>,
    ) -> Result<Vec<InstrumentMeta>, MarketDataError> {
        self.call(ProviderRequest::Instruments(exchange.to_string()), priority, ttl)
            .await?
            .into_instruments()
    }

    /// Current ATM strike of an index, from its spot LTP.
    pub async fn atm_strike(
        &self,
        index: &IndexSpec,
        priority: RequestPriority,
    ) -> Result<Decimal, MarketDataError> {
        let prices = self
            .ltp(std::slice::from_ref(&index.spot_symbol), priority)
            .await?;
        let spot = prices
            .get(&index.spot_symbol)
            .copied()
            .unwrap_or(Decimal::ZERO);
        self.validator
            .validate_price(spot)
            .map_err(|e| MarketDataError::ValidationFailed {
                message: format!("Could not get spot price for {}: {}", index.name, e),
            })?;

        let atm = atm_strike(spot, index.strike_step);
        debug!("ATM strike for {}: {} (spot {})", index.name, atm, spot);
        Ok(atm)
    }

    /// `getStats`.
    pub fn get_stats(&self) -> ProviderStats {
        let m = self.metrics.snapshot();
        ProviderStats {
            provider: self.provider.id().to_string(),
            total_requests: m.total_requests,
            successful_requests: m.successful_requests,
            failed_requests: m.failed_requests,
            success_rate: m.success_rate(),
            average_latency_ms: m.average_latency().as_secs_f64() * 1000.0,
            cache_hit_rate: m.cache_hit_rate(),
            rate_limited_count: m.rate_limited_requests,
            consecutive_failures: m.consecutive_failures,
            requests_per_minute: self.settings.requests_per_minute,
            max_concurrent: self.settings.max_concurrent,
            batch_size: self.settings.batch_size,
            cache_ttl_seconds: self.settings.cache_ttl_seconds,
        }
    }

    /// `checkHealth`.
    pub fn check_health(&self) -> HealthReport {
        let m = self.metrics.snapshot();
        let window = self.limiter.snapshot();
        let cache = self.cache.stats();
        HealthReport {
            status: m.status(self.config.health_freshness),
            health_score: m.health_score(),
            backoff_remaining_seconds: window.backoff_remaining.as_secs_f64(),
            consecutive_throttles: window.consecutive_throttles,
            current_window_count: window.requests_in_window,
            cache_enabled: cache.enabled,
            cache_size: cache.size,
            cache_max_size: cache.max_size,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop cached responses and log final counters.
    pub fn shutdown(&self) {
        self.cache.clear();
        let stats = self.get_stats();
        info!(
            "Provider client for {} shut down: {} requests, {:.1}% success, \
             {:.1}% cache hits, {} rate limited",
            stats.provider,
            stats.total_requests,
            stats.success_rate * 100.0,
            stats.cache_hit_rate * 100.0,
            stats.rate_limited_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::IndexRegistry;
    use crate::errors::ProviderFault;
    use crate::gateway::HealthStatus;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::advance;

    /// Provider that replays scripted faults, then answers every id with price 100.
    struct ScriptedProvider {
        faults: Mutex<VecDeque<ProviderFault>>,
        spot: Decimal,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(faults: Vec<ProviderFault>) -> Arc<Self> {
            Arc::new(Self {
                faults: Mutex::new(faults.into()),
                spot: dec!(22467.35),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next_fault(&self) -> Option<ProviderFault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.faults.lock().unwrap().pop_front()
        }
    }

    #[async_trait]
    impl BrokerProvider for ScriptedProvider {
        fn id(&self) -> &'static str {
            "SCRIPTED"
        }

        async fn quote(
            &self,
            instruments: &[InstrumentKey],
        ) -> Result<HashMap<InstrumentKey, OptionQuote>, ProviderFault> {
            if let Some(fault) = self.next_fault() {
                return Err(fault);
            }
            Ok(instruments
                .iter()
                .map(|id| (id.clone(), OptionQuote::new(dec!(100))))
                .collect())
        }

        async fn ltp(
            &self,
            instruments: &[InstrumentKey],
        ) -> Result<HashMap<InstrumentKey, Decimal>, ProviderFault> {
            if let Some(fault) = self.next_fault() {
                return Err(fault);
            }
            Ok(instruments.iter().map(|id| (id.clone(), self.spot)).collect())
        }

        async fn instruments(&self, _exchange: &str) -> Result<Vec<InstrumentMeta>, ProviderFault> {
            if let Some(fault) = self.next_fault() {
                return Err(fault);
            }
            Ok(vec![])
        }
    }

    fn ids(names: &[&str]) -> Vec<InstrumentKey> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn throttled() -> ProviderFault {
        ProviderFault::Throttled("HTTP 429: Too many requests".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_within_ttl_and_miss_after() {
        let provider = ScriptedProvider::new(vec![]);
        let client = ProviderClient::new(provider.clone(), &CollectorConfig::default());
        let request = ids(&["NFO:A"]);

        client.quote(&request, RequestPriority::Normal).await.unwrap();
        assert_eq!(provider.calls(), 1);

        advance(Duration::from_secs(3)).await;
        client.quote(&request, RequestPriority::Normal).await.unwrap();
        assert_eq!(provider.calls(), 1, "served from cache");

        advance(Duration::from_secs(3)).await;
        client.quote(&request, RequestPriority::Normal).await.unwrap();
        assert_eq!(provider.calls(), 2);

        let m = client.metrics().snapshot();
        assert_eq!(m.cache_hits, 1);
        assert_eq!(m.cache_misses, 2);
        assert_eq!(m.total_requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_at_exact_ttl_goes_to_provider() {
        let provider = ScriptedProvider::new(vec![]);
        let client = ProviderClient::new(provider.clone(), &CollectorConfig::default());
        let request = ids(&["NFO:A"]);

        client.quote(&request, RequestPriority::Normal).await.unwrap();
        advance(Duration::from_millis(4999)).await;
        client.quote(&request, RequestPriority::Normal).await.unwrap();
        assert_eq!(provider.calls(), 1);

        advance(Duration::from_millis(1)).await;
        client.quote(&request, RequestPriority::Normal).await.unwrap();
        assert_eq!(provider.calls(), 2, "entry aged exactly 5s is expired");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_capacity_cache_never_serves() {
        let provider = ScriptedProvider::new(vec![]);
        let config = CollectorConfig {
            max_cache_entries: 0,
            ..CollectorConfig::default()
        };
        let client = ProviderClient::new(provider.clone(), &config);
        let request = ids(&["NFO:A"]);

        client.quote(&request, RequestPriority::Normal).await.unwrap();
        client.quote(&request, RequestPriority::Normal).await.unwrap();
        assert_eq!(provider.calls(), 2);
        assert_eq!(client.cache().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_consumes_no_quota() {
        let provider = ScriptedProvider::new(vec![]);
        let client = ProviderClient::new(provider.clone(), &CollectorConfig::default());
        let request = ids(&["NFO:A"]);

        client.ltp(&request, RequestPriority::Normal).await.unwrap();
        for _ in 0..5 {
            client.ltp(&request, RequestPriority::Normal).await.unwrap();
        }
        assert_eq!(client.limiter().snapshot().requests_in_window, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_then_success_retries_exactly_once() {
        let provider = ScriptedProvider::new(vec![throttled()]);
        let client = ProviderClient::new(provider.clone(), &CollectorConfig::default());

        let quotes = client
            .quote(&ids(&["NFO:A"]), RequestPriority::Normal)
            .await
            .unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(provider.calls(), 2);
        assert_eq!(client.limiter().consecutive_throttles(), 1);

        let m = client.metrics().snapshot();
        assert_eq!(m.failed_requests, 1);
        assert_eq!(m.successful_requests, 1);
        assert_eq!(m.rate_limited_requests, 1);

        // A later clean success clears the streak.
        client
            .quote(&ids(&["NFO:B"]), RequestPriority::Normal)
            .await
            .unwrap();
        assert_eq!(client.limiter().consecutive_throttles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_out_backoff_for_normal_priority() {
        let provider = ScriptedProvider::new(vec![throttled()]);
        let client = ProviderClient::new(provider.clone(), &CollectorConfig::default());

        let started = Instant::now();
        client
            .quote(&ids(&["NFO:A"]), RequestPriority::Normal)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_throttle_surfaces_error() {
        let provider = ScriptedProvider::new(vec![throttled(), throttled()]);
        let client = ProviderClient::new(provider.clone(), &CollectorConfig::default());

        let err = client
            .quote(&ids(&["NFO:A"]), RequestPriority::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Throttled { .. }));
        assert_eq!(provider.calls(), 2);
        assert_eq!(client.limiter().consecutive_throttles(), 2);
        assert_eq!(client.cache().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_is_not_retried() {
        let provider =
            ScriptedProvider::new(vec![ProviderFault::Other("connection refused".to_string())]);
        let client = ProviderClient::new(provider.clone(), &CollectorConfig::default());

        let err = client
            .quote(&ids(&["NFO:A"]), RequestPriority::Normal)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MarketDataError::ProviderError {
                provider: "SCRIPTED".to_string(),
                message: "connection refused".to_string(),
            }
        );
        assert_eq!(provider.calls(), 1);
        assert_eq!(client.limiter().consecutive_throttles(), 0);
        assert_eq!(client.metrics().snapshot().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_timeout() {
        let config = CollectorConfig {
            requests_per_minute: 60,
            max_wait_seconds: 0,
            ..CollectorConfig::default()
        };
        let provider = ScriptedProvider::new(vec![]);
        let client = ProviderClient::new(provider.clone(), &config);

        client.ltp(&ids(&["A"]), RequestPriority::Normal).await.unwrap();
        let err = client
            .ltp(&ids(&["B"]), RequestPriority::Normal)
            .await
            .unwrap_err();

        assert!(matches!(err, MarketDataError::RateLimitTimeout { .. }));
        assert_eq!(provider.calls(), 1);
        let m = client.metrics().snapshot();
        assert_eq!(m.rate_limited_requests, 1);
        assert_eq!(m.failed_requests, 1);
        assert_eq!(client.limiter().consecutive_throttles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_request_never_reaches_provider() {
        let provider = ScriptedProvider::new(vec![]);
        let client = ProviderClient::new(provider.clone(), &CollectorConfig::default());

        let err = client.quote(&[], RequestPriority::High).await.unwrap_err();
        assert!(matches!(err, MarketDataError::InvalidRequest(_)));
        assert_eq!(provider.calls(), 0);
        assert_eq!(client.metrics().snapshot().total_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_override() {
        let provider = ScriptedProvider::new(vec![]);
        let client = ProviderClient::new(provider.clone(), &CollectorConfig::default());

        let ttl = Some(Duration::from_secs(3600));
        client.instruments("NFO", RequestPriority::Low, ttl).await.unwrap();
        advance(Duration::from_secs(600)).await;
        client.instruments(" nfo", RequestPriority::Low, ttl).await.unwrap();
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_atm_strike() {
        let provider = ScriptedProvider::new(vec![]);
        let client = ProviderClient::new(provider.clone(), &CollectorConfig::default());
        let nifty = IndexRegistry::builtin().get("NIFTY").unwrap();

        let atm = client.atm_strike(nifty, RequestPriority::High).await.unwrap();
        assert_eq!(atm, dec!(22450));
    }

    #[tokio::test(start_paused = true)]
    async fn test_atm_strike_without_spot_fails() {
        let provider = Arc::new(ScriptedProvider {
            faults: Mutex::new(VecDeque::new()),
            spot: Decimal::ZERO,
            calls: AtomicUsize::new(0),
        });
        let client = ProviderClient::new(provider, &CollectorConfig::default());
        let nifty = IndexRegistry::builtin().get("NIFTY").unwrap();

        let err = client.atm_strike(nifty, RequestPriority::High).await.unwrap_err();
        assert!(matches!(err, MarketDataError::ValidationFailed { .. }));
        assert!(err
            .to_string()
            .contains("Could not get spot price for NIFTY: Validation failed: Non-positive price"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_health() {
        let provider = ScriptedProvider::new(vec![]);
        let client = ProviderClient::new(provider, &CollectorConfig::default());

        client.ltp(&ids(&["A"]), RequestPriority::Normal).await.unwrap();
        client.ltp(&ids(&["A"]), RequestPriority::Normal).await.unwrap();

        let stats = client.get_stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.success_rate, 1.0);
        assert_eq!(stats.cache_hit_rate, 0.5);
        assert_eq!(stats.requests_per_minute, 180);
        assert_eq!(stats.batch_size, 25);

        let health = client.check_health();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.health_score, 1.0);
        assert_eq!(health.backoff_remaining_seconds, 0.0);
        assert_eq!(health.current_window_count, 1);
        assert_eq!(health.cache_size, 1);
        assert_eq!(health.cache_max_size, 1000);

        client.shutdown();
        assert_eq!(client.check_health().cache_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_reports_backoff() {
        let provider = ScriptedProvider::new(vec![throttled(), throttled()]);
        let client = ProviderClient::new(provider, &CollectorConfig::default());

        let _ = client.quote(&ids(&["A"]), RequestPriority::Critical).await;
        let health = client.check_health();
        assert_eq!(health.consecutive_throttles, 2);
        assert!(health.backoff_remaining_seconds > 0.0);
        assert_eq!(health.status, HealthStatus::Degraded);
    }
}
