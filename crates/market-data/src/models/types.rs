use serde::{Deserialize, Serialize};

/// Instrument identifier as understood by the provider (e.g. `NFO:NIFTY24091925000CE`).
pub type InstrumentKey = String;

/// Request priority tiers.
///
/// Ordered from lowest to highest: Low < Normal < High < Critical.
/// Higher tiers get a larger share of the per-minute budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[derive(Default)]
pub enum RequestPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl RequestPriority {
    /// All tiers, lowest first.
    pub const ALL: [RequestPriority; 4] = [
        RequestPriority::Low,
        RequestPriority::Normal,
        RequestPriority::High,
        RequestPriority::Critical,
    ];

    /// Share of the per-minute budget this tier may consume.
    ///
    /// `None` means the tier is only bounded by backoff and spacing.
    pub fn budget_share(&self) -> Option<f64> {
        match self {
            RequestPriority::Low => Some(0.4),
            RequestPriority::Normal => Some(0.6),
            RequestPriority::High => Some(0.8),
            RequestPriority::Critical => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPriority::Low => "LOW",
            RequestPriority::Normal => "NORMAL",
            RequestPriority::High => "HIGH",
            RequestPriority::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RequestPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider operations the gateway knows how to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMethod {
    Quote,
    Ltp,
    Instruments,
}

impl ProviderMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderMethod::Quote => "quote",
            ProviderMethod::Ltp => "ltp",
            ProviderMethod::Instruments => "instruments",
        }
    }
}

impl std::fmt::Display for ProviderMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
