//! Option trading symbols and weekly expiry.
//!
//! Symbols follow the `INDEX + YYMMDD + STRIKE + CE|PE` layout, for example
//! `NIFTY24061322500CE`. Provider keys prefix the listing exchange:
//! `NFO:NIFTY24061322500CE`.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;
use crate::models::InstrumentKey;

/// Hour after which the current Thursday's contract is treated as expired.
const EXPIRY_CUTOFF_HOUR: u32 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionSide {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionSide {
    pub const BOTH: [OptionSide; 2] = [OptionSide::Call, OptionSide::Put];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionSide::Call => "CE",
            OptionSide::Put => "PE",
        }
    }
}

impl std::fmt::Display for OptionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single option contract in an index chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContract {
    pub index: String,
    pub expiry: NaiveDate,
    pub strike: Decimal,
    pub side: OptionSide,
}

impl OptionContract {
    /// Trading symbol, e.g. `NIFTY24061322500CE`.
    pub fn symbol(&self) -> String {
        format!(
            "{}{}{}{}",
            self.index,
            self.expiry.format("%y%m%d"),
            self.strike.trunc().normalize(),
            self.side
        )
    }

    /// Provider key, e.g. `NFO:NIFTY24061322500CE`.
    pub fn instrument_key(&self, exchange: &str) -> InstrumentKey {
        format!("{}:{}", exchange, self.symbol())
    }
}

impl std::fmt::Display for OptionContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.symbol())
    }
}

/// Parse a trading symbol or provider key back into its parts.
pub fn parse_option_symbol(symbol: &str) -> Result<OptionContract, MarketDataError> {
    let invalid = || MarketDataError::InvalidRequest(format!("Invalid option symbol: {}", symbol));

    let bare = symbol
        .rsplit_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or(symbol)
        .trim();

    let side = if bare.ends_with("CE") {
        OptionSide::Call
    } else if bare.ends_with("PE") {
        OptionSide::Put
    } else {
        return Err(invalid());
    };
    let body = &bare[..bare.len() - 2];

    let digits_at = body
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (index, numbers) = body.split_at(digits_at);
    if index.is_empty() || numbers.len() <= 6 || !numbers.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let (date_part, strike_part) = numbers.split_at(6);
    let expiry = NaiveDate::parse_from_str(date_part, "%y%m%d").map_err(|_| invalid())?;
    let strike: Decimal = strike_part.parse().map_err(|_| invalid())?;

    Ok(OptionContract {
        index: index.to_string(),
        expiry,
        strike,
        side,
    })
}

/// Next weekly expiry (Thursday) as seen from `now`.
///
/// On a Thursday at or after 15:00 the following week's Thursday is returned.
pub fn weekly_expiry(now: NaiveDateTime) -> NaiveDate {
    let today = now.date();
    let thursday = Weekday::Thu.num_days_from_monday() as i64;
    let weekday = today.weekday().num_days_from_monday() as i64;
    let mut days = (thursday - weekday).rem_euclid(7);
    if days == 0 && now.hour() >= EXPIRY_CUTOFF_HOUR {
        days = 7;
    }
    today + Duration::days(days)
}
