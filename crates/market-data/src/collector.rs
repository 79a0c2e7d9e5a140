//! Option chain collector.
//!
//! One collection cycle per index: spot LTP → ATM strike → strike ladder →
//! scheduler. Results are handed to a [`CollectionSink`]; storage formats
//! live outside this crate.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::chain::{chain_instrument_keys, weekly_expiry, IndexRegistry};
use crate::config::CollectorConfig;
use crate::errors::MarketDataError;
use crate::gateway::ProviderClient;
use crate::models::{CollectionResult, RequestPriority};
use crate::scheduler::BatchScheduler;

/// Shortest polling interval `run` accepts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Downstream consumer of collection results.
#[async_trait]
pub trait CollectionSink: Send + Sync {
    async fn store(&self, index: &str, result: &CollectionResult) -> Result<(), MarketDataError>;
}

/// Collection-level counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetrics {
    pub total_collections: u64,
    pub successful_collections: u64,
    pub failed_collections: u64,
    pub total_options_processed: u64,
    pub total_collection_time: Duration,
}

impl CollectionMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_collections == 0 {
            return 0.0;
        }
        self.successful_collections as f64 / self.total_collections as f64
    }

    /// Total time over all collections, failed ones included.
    pub fn average_collection_time(&self) -> Duration {
        if self.total_collections == 0 {
            return Duration::ZERO;
        }
        self.total_collection_time.div_f64(self.total_collections as f64)
    }

    pub fn options_per_second(&self) -> f64 {
        let secs = self.total_collection_time.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_options_processed as f64 / secs
    }
}

pub struct OptionChainCollector {
    client: Arc<ProviderClient>,
    scheduler: BatchScheduler,
    registry: IndexRegistry,
    metrics: Mutex<CollectionMetrics>,
}

impl OptionChainCollector {
    pub fn new(client: Arc<ProviderClient>, config: &CollectorConfig) -> Self {
        Self {
            scheduler: BatchScheduler::new(client.clone(), config.scheduler()),
            registry: IndexRegistry::builtin().clone(),
            metrics: Mutex::new(CollectionMetrics::default()),
            client,
        }
    }

    pub fn with_registry(mut self, registry: IndexRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    pub fn client(&self) -> &Arc<ProviderClient> {
        &self.client
    }

    fn lock_metrics(&self) -> MutexGuard<'_, CollectionMetrics> {
        self.metrics.lock().unwrap_or_else(|poisoned| {
            warn!("Collection metrics mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn metrics(&self) -> CollectionMetrics {
        self.lock_metrics().clone()
    }

    /// Collect the current weekly chain around ATM for `index`.
    pub async fn collect_index(&self, index: &str) -> CollectionResult {
        self.collect_index_at(index, Local::now().naive_local()).await
    }

    /// Same as [`collect_index`](Self::collect_index) with an explicit local time
    /// for expiry selection.
    pub async fn collect_index_at(&self, index: &str, now: NaiveDateTime) -> CollectionResult {
        let started = Instant::now();
        self.lock_metrics().total_collections += 1;

        let spec = match self.registry.get(index) {
            Ok(spec) => spec,
            Err(e) => return self.fail(index, e.to_string(), started),
        };

        let atm = match self.client.atm_strike(spec, RequestPriority::High).await {
            Ok(atm) => atm,
            Err(e) => {
                error!(index = %spec.name, error = %e, "Failed to get ATM strike");
                return self.fail(
                    index,
                    format!("Failed to get ATM strike for {}: {}", spec.name, e),
                    started,
                );
            }
        };

        let expiry = weekly_expiry(now);
        let instruments = chain_instrument_keys(spec, atm, expiry);
        if instruments.is_empty() {
            return self.fail(index, "No instruments found".to_string(), started);
        }
        debug!(
            index = %spec.name,
            %atm,
            %expiry,
            instruments = instruments.len(),
            "Collecting option chain"
        );

        let result = self
            .scheduler
            .collect(&instruments, RequestPriority::High)
            .await;

        let elapsed = started.elapsed();
        {
            let mut m = self.lock_metrics();
            if result.success {
                m.successful_collections += 1;
                m.total_options_processed += result.succeeded_count as u64;
            } else {
                m.failed_collections += 1;
            }
            m.total_collection_time += elapsed;
        }

        info!(
            index = %spec.name,
            succeeded = result.succeeded_count,
            requested = result.requested_count,
            success_rate = result.success_rate(),
            elapsed_ms = elapsed.as_millis() as u64,
            "ATM collection completed"
        );
        result
    }

    fn fail(&self, index: &str, message: String, started: Instant) -> CollectionResult {
        warn!(index, %message, "Collection failed before reaching the scheduler");
        {
            let mut m = self.lock_metrics();
            m.failed_collections += 1;
            m.total_collection_time += started.elapsed();
        }
        CollectionResult::failed(message)
    }

    /// Poll every index each `every` until `shutdown` turns true or its sender
    /// is dropped. Returns the number of completed cycles.
    ///
    /// A zero `every` is raised to [`MIN_POLL_INTERVAL`].
    pub async fn run(
        &self,
        indices: &[String],
        every: Duration,
        sink: &dyn CollectionSink,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        if *shutdown.borrow() {
            info!("Collector shutdown requested before start");
            self.client.shutdown();
            return 0;
        }

        let every = if every.is_zero() {
            warn!(
                interval_secs = MIN_POLL_INTERVAL.as_secs_f64(),
                "Zero polling interval, using the minimum"
            );
            MIN_POLL_INTERVAL
        } else {
            every
        };
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        info!(indices = ?indices, interval_secs = every.as_secs_f64(), "Collector started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            for index in indices {
                let result = self.collect_index(index).await;
                if let Err(e) = sink.store(index, &result).await {
                    warn!(index = %index, error = %e, "Sink rejected collection result");
                }
            }
            cycles += 1;
        }

        let m = self.metrics();
        info!(
            cycles,
            collections = m.total_collections,
            success_rate = m.success_rate(),
            options_per_second = m.options_per_second(),
            "Collector stopped"
        );
        self.client.shutdown();
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderFault;
    use crate::models::{InstrumentKey, InstrumentMeta, OptionQuote};
    use crate::provider::BrokerProvider;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct FakeBroker {
        spot: Option<Decimal>,
    }

    #[async_trait]
    impl BrokerProvider for FakeBroker {
        fn id(&self) -> &'static str {
            "FAKE"
        }

        async fn quote(
            &self,
            instruments: &[InstrumentKey],
        ) -> Result<HashMap<InstrumentKey, OptionQuote>, ProviderFault> {
            Ok(instruments
                .iter()
                .map(|id| (id.clone(), OptionQuote::new(dec!(87.25)).with_activity(10, 100)))
                .collect())
        }

        async fn ltp(
            &self,
            instruments: &[InstrumentKey],
        ) -> Result<HashMap<InstrumentKey, Decimal>, ProviderFault> {
            match self.spot {
                Some(spot) => Ok(instruments.iter().map(|id| (id.clone(), spot)).collect()),
                None => Err(ProviderFault::Other("HTTP 403: Invalid token".to_string())),
            }
        }

        async fn instruments(&self, _exchange: &str) -> Result<Vec<InstrumentMeta>, ProviderFault> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct MemorySink {
        stored: Mutex<Vec<(String, CollectionResult)>>,
    }

    #[async_trait]
    impl CollectionSink for MemorySink {
        async fn store(
            &self,
            index: &str,
            result: &CollectionResult,
        ) -> Result<(), MarketDataError> {
            self.stored
                .lock()
                .unwrap()
                .push((index.to_string(), result.clone()));
            Ok(())
        }
    }

    fn collector(spot: Option<Decimal>) -> OptionChainCollector {
        let config = CollectorConfig::default();
        let client = Arc::new(ProviderClient::new(Arc::new(FakeBroker { spot }), &config));
        OptionChainCollector::new(client, &config)
    }

    fn monday_morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_index_builds_atm_chain() {
        let collector = collector(Some(dec!(22467.35)));
        let result = collector.collect_index_at("NIFTY", monday_morning()).await;

        assert_eq!(result.requested_count, 22);
        assert_eq!(result.succeeded_count, 22);
        assert!(result.success);
        assert!(result
            .per_instrument_results
            .contains_key("NFO:NIFTY24061322450CE"));
        assert!(result
            .per_instrument_results
            .contains_key("NFO:NIFTY24061322200PE"));

        let m = collector.metrics();
        assert_eq!(m.total_collections, 1);
        assert_eq!(m.successful_collections, 1);
        assert_eq!(m.total_options_processed, 22);
    }

    #[tokio::test(start_paused = true)]
    async fn test_atm_failure_yields_failed_result() {
        let collector = collector(None);
        let result = collector.collect_index_at("BANKNIFTY", monday_morning()).await;

        assert!(!result.success);
        assert_eq!(result.requested_count, 0);
        assert!(result
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Failed to get ATM strike for BANKNIFTY"));
        assert_eq!(collector.metrics().failed_collections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_index_yields_failed_result() {
        let collector = collector(Some(dec!(100)));
        let result = collector.collect_index_at("SENSEX", monday_morning()).await;
        assert!(!result.success);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Invalid request: Unknown index: SENSEX")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_offsets() {
        let mut registry = IndexRegistry::builtin().clone();
        registry.set_offsets("FINNIFTY", vec![-1, 0, 1]).unwrap();
        let collector = collector(Some(dec!(21010))).with_registry(registry);

        let result = collector.collect_index_at("FINNIFTY", monday_morning()).await;
        assert_eq!(result.requested_count, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_shutdown() {
        let collector = collector(Some(dec!(22467.35)));
        let sink = MemorySink::default();
        let (tx, rx) = watch::channel(false);
        let indices = vec!["NIFTY".to_string(), "BANKNIFTY".to_string()];

        let stop = async {
            tokio::time::sleep(Duration::from_secs(90)).await;
            tx.send(true).unwrap();
        };
        let (cycles, ()) = tokio::join!(
            collector.run(&indices, Duration::from_secs(60), &sink, rx),
            stop
        );

        assert_eq!(cycles, 2);
        let stored = sink.stored.lock().unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[0].0, "NIFTY");
        assert_eq!(stored[1].0, "BANKNIFTY");
        assert!(stored.iter().all(|(_, result)| result.success));
    }

    #[test]
    fn test_collection_metrics_rates() {
        let m = CollectionMetrics {
            total_collections: 4,
            successful_collections: 2,
            failed_collections: 2,
            total_options_processed: 44,
            total_collection_time: Duration::from_secs(4),
        };
        assert_eq!(m.success_rate(), 0.5);
        assert_eq!(m.average_collection_time(), Duration::from_secs(1));
        assert_eq!(m.options_per_second(), 11.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_average_time_spans_failed_collections() {
        let collector = collector(Some(dec!(22467.35)));

        let ok = collector.collect_index_at("NIFTY", monday_morning()).await;
        assert!(ok.success);
        let after_success = collector.metrics().total_collection_time;
        assert!(after_success > Duration::ZERO);

        let failed = collector.collect_index_at("SENSEX", monday_morning()).await;
        assert!(!failed.success);

        let m = collector.metrics();
        assert_eq!(m.total_collections, 2);
        assert_eq!(m.successful_collections, 1);
        assert_eq!(m.failed_collections, 1);
        assert_eq!(m.total_collection_time, after_success);
        let expected = after_success.as_secs_f64() / 2.0;
        assert!((m.average_collection_time().as_secs_f64() - expected).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_shutdown_already_requested() {
        let collector = collector(Some(dec!(22467.35)));
        let sink = MemorySink::default();
        let (_tx, rx) = watch::channel(true);

        let cycles = collector
            .run(&["NIFTY".to_string()], Duration::ZERO, &sink, rx)
            .await;

        assert_eq!(cycles, 0);
        assert!(sink.stored.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_zero_interval_uses_minimum() {
        let collector = collector(Some(dec!(22467.35)));
        let sink = MemorySink::default();
        let (tx, rx) = watch::channel(false);

        let stop = async {
            tokio::time::sleep(MIN_POLL_INTERVAL * 2 + Duration::from_millis(500)).await;
            tx.send(true).unwrap();
        };
        let symbols = ["NIFTY".to_string()];
        let (cycles, ()) = tokio::join!(
            collector.run(&symbols, Duration::ZERO, &sink, rx),
            stop
        );

        assert_eq!(cycles, 3);
        assert_eq!(sink.stored.lock().unwrap().len(), 3);
    }
}
