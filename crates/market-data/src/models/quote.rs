use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Open/high/low/close block of a quote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// One price level of the order book.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: u64,
    pub orders: u32,
}

/// Top-of-book depth, best level first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub buy: Vec<DepthLevel>,
    pub sell: Vec<DepthLevel>,
}

impl MarketDepth {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.buy.first().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.sell.first().map(|level| level.price)
    }
}

/// Full quote for a single instrument as returned by the provider's `quote` operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionQuote {
    /// Last traded price (required)
    pub last_price: Decimal,

    /// Traded volume for the session
    #[serde(default)]
    pub volume: u64,

    /// Open interest
    #[serde(default)]
    pub open_interest: u64,

    /// Change against previous close
    #[serde(default)]
    pub net_change: Decimal,

    /// Session OHLC (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ohlc: Option<Ohlc>,

    /// Market depth (only when the provider returns it)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<MarketDepth>,
}

impl OptionQuote {
    /// Create a quote with only the last traded price set.
    pub fn new(last_price: Decimal) -> Self {
        Self {
            last_price,
            volume: 0,
            open_interest: 0,
            net_change: Decimal::ZERO,
            ohlc: None,
            depth: None,
        }
    }

    pub fn with_activity(mut self, volume: u64, open_interest: u64) -> Self {
        self.volume = volume;
        self.open_interest = open_interest;
        self
    }

    pub fn with_ohlc(mut self, ohlc: Ohlc) -> Self {
        self.ohlc = Some(ohlc);
        self
    }
}
