use std::collections::HashSet;

use crate::config::BatchMode;
use crate::models::{InstrumentKey, RequestPriority};

/// Consecutive slice of a collection request, at most `batch_size` long.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentBatch {
    /// Position of the batch in the plan.
    pub index: usize,
    pub instruments: Vec<InstrumentKey>,
}

impl InstrumentBatch {
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

/// Trim ids and drop blanks and repeats, keeping first-seen order.
pub fn dedup_instruments(ids: &[InstrumentKey]) -> Vec<InstrumentKey> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Partition into consecutive batches of `batch_size` (the last may be shorter).
pub fn plan_batches(ids: &[InstrumentKey], batch_size: usize) -> Vec<InstrumentBatch> {
    ids.chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| InstrumentBatch {
            index,
            instruments: chunk.to_vec(),
        })
        .collect()
}

/// Resolve `Auto` for a given request.
///
/// A single batch always runs inline; `Auto` runs HIGH and CRITICAL work
/// concurrently and everything else sequentially.
pub fn resolve_mode(mode: BatchMode, priority: RequestPriority, batches: usize) -> BatchMode {
    if batches <= 1 {
        return BatchMode::Sequential;
    }
    match mode {
        BatchMode::Auto if priority >= RequestPriority::High => BatchMode::Concurrent,
        BatchMode::Auto => BatchMode::Sequential,
        explicit => explicit,
    }
}
