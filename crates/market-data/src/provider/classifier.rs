//! Provider response classification.
//!
//! Turns raw provider signals into a [`ProviderFault`]. Status codes are the
//! preferred signal. Some brokerage SDKs only surface an error string, so a
//! message-based fallback is provided; it matches on known phrases and is
//! therefore only as reliable as the provider's wording.

use crate::errors::ProviderFault;

const THROTTLE_PHRASES: &[&str] = &["too many requests", "rate limit", "throttl"];
const TIMEOUT_PHRASES: &[&str] = &["timed out", "timeout", "deadline exceeded"];

/// Classify an HTTP status and body.
///
/// Returns `None` for 2xx responses.
pub fn classify_status(status: u16, body: &str) -> Option<ProviderFault> {
    match status {
        200..=299 => None,
        429 => Some(ProviderFault::Throttled(detail(status, body))),
        408 | 504 => Some(ProviderFault::Timeout(detail(status, body))),
        // Some gateways answer 503 with a throttle message instead of a 429.
        503 if mentions_any(body, THROTTLE_PHRASES) => {
            Some(ProviderFault::Throttled(detail(status, body)))
        }
        _ => Some(ProviderFault::Other(detail(status, body))),
    }
}

/// Classify an error message when no status code is available.
pub fn classify_message(message: &str) -> ProviderFault {
    if mentions_any(message, THROTTLE_PHRASES) {
        ProviderFault::Throttled(message.to_string())
    } else if mentions_any(message, TIMEOUT_PHRASES) {
        ProviderFault::Timeout(message.to_string())
    } else {
        ProviderFault::Other(message.to_string())
    }
}

fn mentions_any(text: &str, phrases: &[&str]) -> bool {
    let lower = text.to_lowercase();
    phrases.iter().any(|phrase| lower.contains(phrase))
}

fn detail(status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}
