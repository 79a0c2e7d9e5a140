/// Classification for retry policy.
///
/// Used by the provider client to decide whether a failed call is worth a
/// second attempt.
///
/// # Behavior Summary
///
/// | Class | Retried? | Reports backoff to the limiter? |
/// |-------|----------|---------------------------------|
/// | `Never` | No | No |
/// | `RetryOnceAfterBackoff` | Exactly once | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - connectivity, auth, malformed responses, or a limiter
    /// that never granted a slot. Retrying would only burn quota.
    Never,

    /// The provider throttled us. Enter backoff and retry the whole call
    /// (cache check, admission, invoke) one more time.
    RetryOnceAfterBackoff,
}
