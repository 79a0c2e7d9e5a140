//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all gateway operations
//! - [`ProviderFault`]: The tagged failure a provider implementation reports
//! - [`ErrorKind`]: Flat classification used in call outcomes and metrics
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a provider implementation.
///
/// Providers classify their own responses (see
/// [`classify_status`](crate::provider::classify_status)) so the client can
/// pattern-match instead of parsing error text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderFault {
    /// The provider signalled that our request rate is too high.
    #[error("throttled: {0}")]
    Throttled(String),

    /// The provider did not answer in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Anything else: auth, network, malformed payload.
    #[error("{0}")]
    Other(String),
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("could not parse environment variable {var}='{value}'")]
    Env { var: String, value: String },

    #[error("could not parse configuration: {0}")]
    Parse(String),
}

/// Errors that can occur during market data operations.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which determines how the
/// provider client handles the error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// The rate limiter never granted a slot within the wait budget.
    /// Counted as a failed call; not retried further.
    #[error("Rate limit wait timed out after {waited:?}")]
    RateLimitTimeout {
        /// How long the caller waited before giving up
        waited: Duration,
    },

    /// The provider throttled the request.
    /// Triggers limiter backoff and exactly one automatic retry.
    #[error("Throttled by {provider}: {detail}")]
    Throttled {
        /// The provider that throttled the request
        provider: String,
        /// Provider supplied detail
        detail: String,
    },

    /// The provider did not respond in time.
    #[error("Timeout: {provider} - {detail}")]
    Timeout {
        /// The provider that timed out
        provider: String,
        /// Provider supplied detail
        detail: String,
    },

    /// Any other provider failure (auth, network, malformed response).
    /// Surfaced immediately without retry.
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The request was rejected before reaching the provider.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Data validation failed.
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Description of the validation failure
        message: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MarketDataError {
    /// Build a `MarketDataError` from a provider fault.
    pub fn from_fault(provider: &str, fault: ProviderFault) -> Self {
        match fault {
            ProviderFault::Throttled(detail) => Self::Throttled {
                provider: provider.to_string(),
                detail,
            },
            ProviderFault::Timeout(detail) => Self::Timeout {
                provider: provider.to_string(),
                detail,
            },
            ProviderFault::Other(message) => Self::ProviderError {
                provider: provider.to_string(),
                message,
            },
        }
    }

    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use strikewatch_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::Throttled {
    ///     provider: "KITE".to_string(),
    ///     detail: "Too many requests".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::RetryOnceAfterBackoff);
    ///
    /// let error = MarketDataError::ProviderError {
    ///     provider: "KITE".to_string(),
    ///     message: "connection reset".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Throttled { .. } => RetryClass::RetryOnceAfterBackoff,
            Self::RateLimitTimeout { .. }
            | Self::Timeout { .. }
            | Self::ProviderError { .. }
            | Self::InvalidRequest(_)
            | Self::ValidationFailed { .. }
            | Self::Config(_) => RetryClass::Never,
        }
    }

    /// Flat classification used in [`ProviderCallOutcome`](crate::models::ProviderCallOutcome).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimitTimeout { .. } => ErrorKind::RateLimited,
            Self::Throttled { .. } => ErrorKind::Throttled,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ProviderError { .. }
            | Self::InvalidRequest(_)
            | Self::ValidationFailed { .. }
            | Self::Config(_) => ErrorKind::ProviderError,
        }
    }

    /// Whether this failure was caused by rate limiting on either side.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind(), ErrorKind::RateLimited | ErrorKind::Throttled)
    }
}

/// Outcome classification of a single provider call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[default]
    None,
    /// Our own limiter refused to admit the call in time.
    RateLimited,
    /// The provider throttled the call.
    Throttled,
    ProviderError,
    Timeout,
}
