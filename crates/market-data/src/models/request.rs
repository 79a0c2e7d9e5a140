use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::instrument::InstrumentMeta;
use super::quote::OptionQuote;
use super::types::{InstrumentKey, ProviderMethod};
use crate::errors::{ErrorKind, MarketDataError};

/// A single logical provider call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum ProviderRequest {
    /// Full quotes for a set of instruments
    Quote(Vec<InstrumentKey>),
    /// Last traded prices for a set of instruments
    Ltp(Vec<InstrumentKey>),
    /// Instrument master for an exchange
    Instruments(String),
}

impl ProviderRequest {
    pub fn method(&self) -> ProviderMethod {
        match self {
            ProviderRequest::Quote(_) => ProviderMethod::Quote,
            ProviderRequest::Ltp(_) => ProviderMethod::Ltp,
            ProviderRequest::Instruments(_) => ProviderMethod::Instruments,
        }
    }

    /// Parameters in canonical form: instrument lists sorted and de-duplicated,
    /// exchange codes trimmed and upper-cased.
    ///
    /// Two requests that differ only in ordering or duplicates produce the same
    /// canonical parameters and therefore the same cache fingerprint.
    pub fn normalized_params(&self) -> serde_json::Value {
        match self {
            ProviderRequest::Quote(ids) | ProviderRequest::Ltp(ids) => {
                let mut ids: Vec<&str> = ids.iter().map(|id| id.trim()).collect();
                ids.sort_unstable();
                ids.dedup();
                json!(ids)
            }
            ProviderRequest::Instruments(exchange) => json!(exchange.trim().to_uppercase()),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), MarketDataError> {
        match self {
            ProviderRequest::Quote(ids) | ProviderRequest::Ltp(ids) if ids.is_empty() => {
                Err(MarketDataError::InvalidRequest(format!(
                    "{} request must include at least one instrument",
                    self.method()
                )))
            }
            ProviderRequest::Instruments(exchange) if exchange.trim().is_empty() => Err(
                MarketDataError::InvalidRequest("exchange must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Successful provider payload, as cached by the gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderResponse {
    Quotes(HashMap<InstrumentKey, OptionQuote>),
    Ltp(HashMap<InstrumentKey, Decimal>),
    Instruments(Vec<InstrumentMeta>),
}

impl ProviderResponse {
    pub fn method(&self) -> ProviderMethod {
        match self {
            ProviderResponse::Quotes(_) => ProviderMethod::Quote,
            ProviderResponse::Ltp(_) => ProviderMethod::Ltp,
            ProviderResponse::Instruments(_) => ProviderMethod::Instruments,
        }
    }

    pub fn into_quotes(self) -> Result<HashMap<InstrumentKey, OptionQuote>, MarketDataError> {
        match self {
            ProviderResponse::Quotes(quotes) => Ok(quotes),
            other => Err(mismatch(ProviderMethod::Quote, other.method())),
        }
    }

    pub fn into_ltp(self) -> Result<HashMap<InstrumentKey, Decimal>, MarketDataError> {
        match self {
            ProviderResponse::Ltp(prices) => Ok(prices),
            other => Err(mismatch(ProviderMethod::Ltp, other.method())),
        }
    }

    pub fn into_instruments(self) -> Result<Vec<InstrumentMeta>, MarketDataError> {
        match self {
            ProviderResponse::Instruments(instruments) => Ok(instruments),
            other => Err(mismatch(ProviderMethod::Instruments, other.method())),
        }
    }
}

fn mismatch(expected: ProviderMethod, actual: ProviderMethod) -> MarketDataError {
    MarketDataError::ValidationFailed {
        message: format!("expected a {} response, got {}", expected, actual),
    }
}

/// Record of a single provider attempt.
#[derive(Clone, Debug)]
pub struct ProviderCallOutcome {
    pub success: bool,
    pub value: Option<ProviderResponse>,
    pub latency: Duration,
    pub error_kind: ErrorKind,
    pub error: Option<MarketDataError>,
}

impl ProviderCallOutcome {
    pub fn succeeded(value: ProviderResponse, latency: Duration) -> Self {
        Self {
            success: true,
            value: Some(value),
            latency,
            error_kind: ErrorKind::None,
            error: None,
        }
    }

    pub fn failed(error: MarketDataError, latency: Duration) -> Self {
        Self {
            success: false,
            value: None,
            latency,
            error_kind: error.kind(),
            error: Some(error),
        }
    }

    pub fn latency_seconds(&self) -> f64 {
        self.latency.as_secs_f64()
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.error_kind, ErrorKind::RateLimited | ErrorKind::Throttled)
    }

    pub fn into_result(self) -> Result<ProviderResponse, MarketDataError> {
        match (self.value, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(error),
            (None, None) => Err(MarketDataError::ValidationFailed {
                message: "provider returned no value".to_string(),
            }),
        }
    }
}
