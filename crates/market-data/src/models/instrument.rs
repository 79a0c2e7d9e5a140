use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Instrument master entry returned by the provider's `instruments` operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentMeta {
    /// Provider's numeric token for the instrument
    pub instrument_token: u64,

    /// Exchange trading symbol (e.g., "NIFTY24091925000CE")
    pub tradingsymbol: String,

    /// Underlying name (e.g., "NIFTY")
    pub name: String,

    /// Exchange code (e.g., "NFO")
    pub exchange: String,

    /// Instrument type as reported by the provider ("CE", "PE", "FUT", "EQ")
    pub instrument_type: String,

    /// Strike for options, zero otherwise
    #[serde(default)]
    pub strike: Decimal,

    /// Expiry for derivatives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,

    #[serde(default)]
    pub lot_size: u32,

    #[serde(default)]
    pub tick_size: Decimal,
}

impl InstrumentMeta {
    /// Provider-qualified identifier (`EXCHANGE:TRADINGSYMBOL`).
    pub fn qualified_symbol(&self) -> String {
        format!("{}:{}", self.exchange, self.tradingsymbol)
    }

    pub fn is_option(&self) -> bool {
        matches!(self.instrument_type.as_str(), "CE" | "PE")
    }
}
