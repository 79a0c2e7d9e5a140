//! Batch scheduler.
//!
//! Splits a collection request into provider-sized batches, runs them
//! through the shared [`ProviderClient`], and merges the answers into one
//! [`CollectionResult`].
//!
//! Failures stay at the smallest unit: a failing batch marks only its own
//! instruments, an invalid record marks only itself, and batches still
//! pending at the collection deadline count as failed instead of blocking.

mod plan;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

pub use plan::{dedup_instruments, plan_batches, resolve_mode, InstrumentBatch};

use crate::config::{BatchMode, SchedulerConfig};
use crate::errors::MarketDataError;
use crate::gateway::{ProviderClient, QuoteValidator};
use crate::models::{
    CollectionResult, FailureReason, InstrumentKey, InstrumentOutcome, OptionQuote,
    RequestPriority,
};

type BatchResult = Result<HashMap<InstrumentKey, OptionQuote>, MarketDataError>;

pub struct BatchScheduler {
    client: Arc<ProviderClient>,
    config: SchedulerConfig,
    validator: QuoteValidator,
}

impl BatchScheduler {
    pub fn new(client: Arc<ProviderClient>, config: SchedulerConfig) -> Self {
        Self {
            client,
            config,
            validator: QuoteValidator::new(),
        }
    }

    pub fn with_validator(mut self, validator: QuoteValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn client(&self) -> &Arc<ProviderClient> {
        &self.client
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Collect quotes for `instrument_ids`.
    ///
    /// Always returns a complete result, even when every provider call failed.
    ///
    /// Ids are trimmed and de-duplicated first. `requested_count` is the number
    /// of distinct ids, matching the one outcome per key in
    /// `per_instrument_results`, so `["A", "A", "B"]` reports 2 requested.
    pub async fn collect(
        &self,
        instrument_ids: &[InstrumentKey],
        priority: RequestPriority,
    ) -> CollectionResult {
        let started = Instant::now();
        let deadline = started + self.config.collection_timeout;

        let ids = dedup_instruments(instrument_ids);
        if ids.is_empty() {
            debug!("Empty collection request, nothing to do");
            return CollectionResult::from_outcomes(
                BTreeMap::new(),
                self.config.quality_threshold,
                started.elapsed(),
                Some("No instruments requested".to_string()),
            );
        }

        let batches = plan_batches(&ids, self.config.batch_size);
        let mode = resolve_mode(self.config.mode, priority, batches.len());
        debug!(
            instruments = ids.len(),
            batches = batches.len(),
            ?mode,
            %priority,
            "Scheduling collection"
        );

        let completed = match mode {
            BatchMode::Concurrent => self.run_concurrent(&batches, priority, deadline).await,
            BatchMode::Sequential | BatchMode::Auto => {
                self.run_sequential(&batches, priority, deadline).await
            }
        };

        let result = self.merge(&batches, completed, started);
        info!(
            requested = result.requested_count,
            succeeded = result.succeeded_count,
            failed = result.failed_count,
            success = result.success,
            elapsed_ms = result.collection_time.as_millis() as u64,
            "Collection finished"
        );
        result
    }

    async fn run_batch(&self, batch: &InstrumentBatch, priority: RequestPriority) -> BatchResult {
        let result = self.client.quote(&batch.instruments, priority).await;
        if let Err(e) = &result {
            warn!(
                batch = batch.index,
                size = batch.len(),
                error = %e,
                "Batch failed, marking its instruments as failed"
            );
        }
        result
    }

    /// One batch at a time with `batch_delay` between batches.
    async fn run_sequential(
        &self,
        batches: &[InstrumentBatch],
        priority: RequestPriority,
        deadline: Instant,
    ) -> HashMap<usize, BatchResult> {
        let mut completed = HashMap::with_capacity(batches.len());

        for (position, batch) in batches.iter().enumerate() {
            if position > 0 && !self.config.batch_delay.is_zero() {
                sleep_until((Instant::now() + self.config.batch_delay).min(deadline)).await;
            }
            if Instant::now() >= deadline {
                warn!(
                    pending = batches.len() - position,
                    "Collection deadline reached before all batches ran"
                );
                break;
            }

            match timeout_at(deadline, self.run_batch(batch, priority)).await {
                Ok(result) => {
                    completed.insert(batch.index, result);
                }
                Err(_) => {
                    warn!(batch = batch.index, "Batch still pending at collection deadline");
                    break;
                }
            }
        }

        completed
    }

    /// Up to `max_workers` batches in flight. The shared limiter, not the
    /// pool size, is what bounds the request rate.
    async fn run_concurrent(
        &self,
        batches: &[InstrumentBatch],
        priority: RequestPriority,
        deadline: Instant,
    ) -> HashMap<usize, BatchResult> {
        let mut completed = HashMap::with_capacity(batches.len());
        let mut results = stream::iter(batches)
            .map(|batch| async move { (batch.index, self.run_batch(batch, priority).await) })
            .buffer_unordered(self.config.max_workers.max(1));

        let drained = timeout_at(deadline, async {
            while let Some((index, result)) = results.next().await {
                completed.insert(index, result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                pending = batches.len() - completed.len(),
                "Collection deadline reached with batches in flight"
            );
        }
        completed
    }

    fn merge(
        &self,
        batches: &[InstrumentBatch],
        mut completed: HashMap<usize, BatchResult>,
        started: Instant,
    ) -> CollectionResult {
        let mut outcomes = BTreeMap::new();
        let mut batch_errors: Vec<String> = Vec::new();
        let mut timed_out = 0usize;

        for batch in batches {
            match completed.remove(&batch.index) {
                Some(Ok(mut quotes)) => {
                    for id in &batch.instruments {
                        let outcome = match quotes.remove(id) {
                            None => InstrumentOutcome::Failed {
                                reason: FailureReason::Missing,
                            },
                            Some(quote) => match self.validator.validate(id, &quote) {
                                Ok(()) => InstrumentOutcome::Collected { quote },
                                Err(e) => InstrumentOutcome::Failed {
                                    reason: FailureReason::InvalidRecord {
                                        message: e.to_string(),
                                    },
                                },
                            },
                        };
                        outcomes.insert(id.clone(), outcome);
                    }
                }
                Some(Err(e)) => {
                    let reason = FailureReason::BatchFailed {
                        kind: e.kind(),
                        message: e.to_string(),
                    };
                    for id in &batch.instruments {
                        outcomes.insert(
                            id.clone(),
                            InstrumentOutcome::Failed {
                                reason: reason.clone(),
                            },
                        );
                    }
                    batch_errors.push(e.to_string());
                }
                None => {
                    timed_out += 1;
                    for id in &batch.instruments {
                        outcomes.insert(
                            id.clone(),
                            InstrumentOutcome::Failed {
                                reason: FailureReason::DeadlineExceeded,
                            },
                        );
                    }
                }
            }
        }

        let error_message = summarize_failures(batches.len(), &batch_errors, timed_out);
        CollectionResult::from_outcomes(
            outcomes,
            self.config.quality_threshold,
            started.elapsed(),
            error_message,
        )
    }
}

fn summarize_failures(total: usize, errors: &[String], timed_out: usize) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(first) = errors.first() {
        parts.push(format!("{} of {} batches failed: {}", errors.len(), total, first));
    }
    if timed_out > 0 {
        parts.push(format!(
            "{} of {} batches did not finish before the collection deadline",
            timed_out, total
        ));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}
