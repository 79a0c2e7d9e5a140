//! Index registry.
//!
//! Built-in definitions are loaded from `indices.json` at compile time and
//! parsed once via `lazy_static`. Callers that need different offsets build
//! their own [`IndexRegistry`] from the built-in one.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use log::error;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexCatalog {
    default_offsets: Vec<i32>,
    indices: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    name: String,
    spot_symbol: String,
    strike_step: Decimal,
    derivatives_exchange: String,
}

/// One tradable index and how its option chain is laid out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    /// Upper-case index name, also the option symbol prefix (e.g. `NIFTY`).
    pub name: String,
    /// Provider key of the underlying spot (e.g. `NSE:NIFTY 50`).
    pub spot_symbol: String,
    /// Distance between listed strikes.
    pub strike_step: Decimal,
    /// Exchange the options are listed on.
    pub derivatives_exchange: String,
    /// Strike offsets from ATM, in steps.
    pub offsets: Vec<i32>,
}

impl IndexSpec {
    pub fn with_offsets(mut self, offsets: Vec<i32>) -> Self {
        self.offsets = offsets;
        self
    }
}

/// Lookup table of index definitions, keyed by upper-case name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexRegistry {
    indices: BTreeMap<String, IndexSpec>,
}

lazy_static! {
    static ref BUILTIN: IndexRegistry = IndexRegistry::load();
}

impl IndexRegistry {
    /// The built-in NSE index set.
    pub fn builtin() -> &'static IndexRegistry {
        &BUILTIN
    }

    pub fn new(specs: impl IntoIterator<Item = IndexSpec>) -> Self {
        let mut registry = Self::default();
        for spec in specs {
            registry.insert(spec);
        }
        registry
    }

    fn load() -> Self {
        let catalog: IndexCatalog = match serde_json::from_str(include_str!("indices.json")) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("Built-in index catalog is invalid: {}", e);
                return Self::default();
            }
        };

        Self::new(catalog.indices.into_iter().map(|entry| IndexSpec {
            name: entry.name,
            spot_symbol: entry.spot_symbol,
            strike_step: entry.strike_step,
            derivatives_exchange: entry.derivatives_exchange,
            offsets: catalog.default_offsets.clone(),
        }))
    }

    /// Add or replace an index definition.
    pub fn insert(&mut self, mut spec: IndexSpec) {
        spec.name = spec.name.trim().to_uppercase();
        self.indices.insert(spec.name.clone(), spec);
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Result<&IndexSpec, MarketDataError> {
        self.indices
            .get(&name.trim().to_uppercase())
            .ok_or_else(|| MarketDataError::InvalidRequest(format!("Unknown index: {}", name)))
    }

    /// Override the offsets of one index.
    pub fn set_offsets(&mut self, name: &str, offsets: Vec<i32>) -> Result<(), MarketDataError> {
        let key = name.trim().to_uppercase();
        match self.indices.get_mut(&key) {
            Some(spec) => {
                spec.offsets = offsets;
                Ok(())
            }
            None => Err(MarketDataError::InvalidRequest(format!(
                "Unknown index: {}",
                name
            ))),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.indices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
