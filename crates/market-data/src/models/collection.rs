use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::quote::OptionQuote;
use super::types::InstrumentKey;
use crate::errors::ErrorKind;

/// Why an instrument did not make it into a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The provider answered the batch but had no entry for this instrument.
    Missing,
    /// The provider returned a record that failed the quality check.
    InvalidRecord { message: String },
    /// The whole batch call failed.
    BatchFailed { kind: ErrorKind, message: String },
    /// The batch was still pending when the collection deadline passed.
    DeadlineExceeded,
}

/// Per-instrument result of a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstrumentOutcome {
    Collected { quote: OptionQuote },
    Failed { reason: FailureReason },
}

impl InstrumentOutcome {
    pub fn is_collected(&self) -> bool {
        matches!(self, InstrumentOutcome::Collected { .. })
    }

    pub fn quote(&self) -> Option<&OptionQuote> {
        match self {
            InstrumentOutcome::Collected { quote } => Some(quote),
            InstrumentOutcome::Failed { .. } => None,
        }
    }
}

/// Terminal artifact of one `collect` call, handed to downstream storage.
///
/// `succeeded_count + failed_count == requested_count` always holds, and
/// `success` is true only when the success rate reaches the quality threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResult {
    pub requested_count: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub per_instrument_results: BTreeMap<InstrumentKey, InstrumentOutcome>,
    pub collection_time: Duration,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CollectionResult {
    /// Build a result from per-instrument outcomes and apply the quality threshold.
    pub fn from_outcomes(
        outcomes: BTreeMap<InstrumentKey, InstrumentOutcome>,
        quality_threshold: f64,
        collection_time: Duration,
        error_message: Option<String>,
    ) -> Self {
        let requested_count = outcomes.len();
        let succeeded_count = outcomes.values().filter(|o| o.is_collected()).count();
        let failed_count = requested_count - succeeded_count;
        let success = meets_threshold(succeeded_count, requested_count, quality_threshold);

        Self {
            requested_count,
            succeeded_count,
            failed_count,
            per_instrument_results: outcomes,
            collection_time,
            success,
            error_message,
        }
    }

    /// A collection that never reached the provider.
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            requested_count: 0,
            succeeded_count: 0,
            failed_count: 0,
            per_instrument_results: BTreeMap::new(),
            collection_time: Duration::ZERO,
            success: false,
            error_message: Some(error_message.into()),
        }
    }

    /// Fraction of requested instruments that were collected (0.0 when nothing was requested).
    pub fn success_rate(&self) -> f64 {
        if self.requested_count == 0 {
            return 0.0;
        }
        self.succeeded_count as f64 / self.requested_count as f64
    }

    /// Collected quotes, keyed by instrument.
    pub fn quotes(&self) -> impl Iterator<Item = (&InstrumentKey, &OptionQuote)> {
        self.per_instrument_results
            .iter()
            .filter_map(|(key, outcome)| outcome.quote().map(|quote| (key, quote)))
    }
}

/// `succeeded / requested >= threshold`, false when nothing was requested.
pub fn meets_threshold(succeeded: usize, requested: usize, threshold: f64) -> bool {
    if requested == 0 {
        return false;
    }
    succeeded as f64 / requested as f64 >= threshold
}
