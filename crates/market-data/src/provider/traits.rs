//! Brokerage provider trait definition.
//!
//! This module defines the `BrokerProvider` trait, the outbound contract the
//! gateway invokes. Wire formats live entirely inside implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::ProviderFault;
use crate::models::{InstrumentKey, InstrumentMeta, OptionQuote};

/// Trait for brokerage market data providers.
///
/// Every method may fail with a [`ProviderFault`]. Implementations should
/// classify throttling responses as [`ProviderFault::Throttled`] (see
/// [`classify_status`](super::classify_status)) so the gateway can back off
/// and retry.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use strikewatch_market_data::provider::BrokerProvider;
///
/// struct KiteProvider {
///     http: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl BrokerProvider for KiteProvider {
///     fn id(&self) -> &'static str {
///         "KITE"
///     }
///
///     // ... implement quote, ltp and instruments
/// }
/// ```
#[async_trait]
pub trait BrokerProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Used for logging and error attribution.
    fn id(&self) -> &'static str;

    /// Full quotes for the given instruments.
    ///
    /// Instruments the provider does not know are simply absent from the map.
    async fn quote(
        &self,
        instruments: &[InstrumentKey],
    ) -> Result<HashMap<InstrumentKey, OptionQuote>, ProviderFault>;

    /// Last traded prices for the given instruments.
    async fn ltp(
        &self,
        instruments: &[InstrumentKey],
    ) -> Result<HashMap<InstrumentKey, Decimal>, ProviderFault>;

    /// Instrument master for an exchange.
    async fn instruments(&self, exchange: &str) -> Result<Vec<InstrumentMeta>, ProviderFault>;
}
