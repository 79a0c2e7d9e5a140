//! Market data models
//!
//! This module contains the core data types for gateway operations:
//! - `types` - Priority tiers, provider methods, instrument key alias
//! - `quote` - Quote payloads (OptionQuote, Ohlc, MarketDepth)
//! - `instrument` - Instrument master entries (InstrumentMeta)
//! - `request` - Provider requests, responses and per-attempt outcomes
//! - `collection` - Collection results and per-instrument outcomes

mod collection;
mod instrument;
mod quote;
mod request;
mod types;

pub use collection::{meets_threshold, CollectionResult, FailureReason, InstrumentOutcome};
pub use instrument::InstrumentMeta;
pub use quote::{DepthLevel, MarketDepth, Ohlc, OptionQuote};
pub use request::{ProviderCallOutcome, ProviderRequest, ProviderResponse};
pub use types::{InstrumentKey, ProviderMethod, RequestPriority};
