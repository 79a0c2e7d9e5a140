//! Record-level quote validation.
//!
//! Applied to every quote the scheduler merges, independent of whether the
//! batch call succeeded:
//! - Non-positive last price (hard failure, the instrument counts as failed)
//! - OHLC invariants (high >= low is hard, open/close outside range is soft)
//! - Price sanity ceiling (soft)
//! - Zero volume (soft)

use log::warn;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::OptionQuote;

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Reject the record.
    Hard,
    /// Accept the record and log a warning.
    Soft,
}

#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Reject high < low.
    pub reject_invalid_ohlc: bool,
    /// Sanity ceiling for prices.
    pub max_price: Option<Decimal>,
    pub warn_on_zero_volume: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            reject_invalid_ohlc: true,
            max_price: Some(Decimal::from(10_000_000i64)),
            // Deep OTM strikes routinely print zero volume.
            warn_on_zero_volume: false,
        }
    }
}

/// Option quote validator.
#[derive(Clone, Debug, Default)]
pub struct QuoteValidator {
    config: ValidatorConfig,
}

impl QuoteValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a single quote.
    ///
    /// Soft issues are logged and do not reject the quote.
    pub fn validate(&self, key: &str, quote: &OptionQuote) -> Result<(), MarketDataError> {
        let issues = self.issues(quote);

        let hard: Vec<&str> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();
        if !hard.is_empty() {
            return Err(MarketDataError::ValidationFailed {
                message: hard.join("; "),
            });
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!("Quote validation warning for {}: {}", key, issue.message);
        }
        Ok(())
    }

    /// Validate a bare price, as returned by `ltp`.
    pub fn validate_price(&self, price: Decimal) -> Result<(), MarketDataError> {
        if price <= Decimal::ZERO {
            return Err(MarketDataError::ValidationFailed {
                message: format!("Non-positive price: {}", price),
            });
        }
        Ok(())
    }

    fn issues(&self, quote: &OptionQuote) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if quote.last_price <= Decimal::ZERO {
            issues.push(hard(format!("Non-positive last price: {}", quote.last_price)));
        }

        if let Some(max_price) = self.config.max_price {
            if quote.last_price > max_price {
                issues.push(soft(format!(
                    "Last price ({}) exceeds max threshold ({})",
                    quote.last_price, max_price
                )));
            }
        }

        if let Some(ohlc) = &quote.ohlc {
            if self.config.reject_invalid_ohlc && ohlc.high < ohlc.low {
                issues.push(hard(format!(
                    "High ({}) is less than Low ({})",
                    ohlc.high, ohlc.low
                )));
            }
            if ohlc.low < Decimal::ZERO {
                issues.push(hard(format!("Negative low price: {}", ohlc.low)));
            }
            if ohlc.open < ohlc.low || ohlc.open > ohlc.high {
                issues.push(soft(format!(
                    "Open ({}) is outside High/Low range ({}-{})",
                    ohlc.open, ohlc.low, ohlc.high
                )));
            }
        }

        if self.config.warn_on_zero_volume && quote.volume == 0 {
            issues.push(soft("Zero volume".to_string()));
        }

        issues
    }
}

fn hard(message: String) -> ValidationIssue {
    ValidationIssue {
        severity: ValidationSeverity::Hard,
        message,
    }
}

fn soft(message: String) -> ValidationIssue {
    ValidationIssue {
        severity: ValidationSeverity::Soft,
        message,
    }
}
