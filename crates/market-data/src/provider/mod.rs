//! Brokerage provider abstractions.
//!
//! This module contains:
//! - The `BrokerProvider` trait the gateway calls out to
//! - Response classification helpers that map provider signals onto
//!   [`ProviderFault`](crate::errors::ProviderFault)
//!
//! Concrete providers (HTTP clients, credentials, wire formats) live outside
//! this crate.

mod classifier;
mod traits;

pub use classifier::{classify_message, classify_status};
pub use traits::BrokerProvider;
