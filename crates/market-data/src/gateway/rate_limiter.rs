//! Priority-tiered rate limiter for the brokerage provider.
//!
//! Tracks a rolling one-minute request window plus a throttle backoff
//! deadline. Each priority tier may consume an overlapping share of the
//! per-minute budget, so an idle system lets any tier use most of it while a
//! congested one throttles the lower tiers first. A minimum spacing between
//! consecutive requests applies to every tier.
//!
//! Waiting callers sleep until the earliest instant their request could be
//! admitted (backoff expiry, window roll, or spacing) and are woken early by
//! [`PriorityRateLimiter::reset`].

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use crate::config::RateLimitConfig;
use crate::errors::MarketDataError;
use crate::models::RequestPriority;

/// Length of the rolling request window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Upper bound on a single throttle backoff.
const MAX_BACKOFF_SECS: u64 = 60;

/// Why a request was not admitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DenyReason {
    /// A throttle backoff is in effect and the request is not CRITICAL.
    Backoff,
    /// The tier's share of the window is used up.
    TierQuota,
    /// The previous request was too recent.
    Spacing,
}

#[derive(Clone, Copy, Debug)]
struct Denial {
    reason: DenyReason,
    /// Earliest instant the same request could be admitted.
    retry_at: Instant,
}

/// Mutable limiter state.
#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    requests_in_window: u32,
    last_request_time: Option<Instant>,
    backoff_until: Option<Instant>,
    consecutive_throttles: u32,
    /// Spacing bypasses consumed in the current window.
    burst_used: u32,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            requests_in_window: 0,
            last_request_time: None,
            backoff_until: None,
            consecutive_throttles: 0,
            burst_used: 0,
        }
    }

    fn roll_if_elapsed(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= WINDOW {
            self.window_start = now;
            self.requests_in_window = 0;
            self.burst_used = 0;
        }
    }
}

/// Point-in-time view of the limiter.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateWindowSnapshot {
    pub requests_per_minute: u32,
    pub requests_in_window: u32,
    pub consecutive_throttles: u32,
    pub backoff_remaining: Duration,
}

/// Priority-aware admission control shared by every worker.
pub struct PriorityRateLimiter {
    config: RateLimitConfig,
    min_interval: Duration,
    window: Mutex<RateWindow>,
    wake: Notify,
}

impl PriorityRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let requests_per_minute = config.requests_per_minute.max(1);
        Self {
            min_interval: WINDOW / requests_per_minute,
            config: RateLimitConfig {
                requests_per_minute,
                ..config
            },
            window: Mutex::new(RateWindow::new(Instant::now())),
            wake: Notify::new(),
        }
    }

    /// Lock the window, recovering from poison if necessary.
    fn lock_window(&self) -> MutexGuard<'_, RateWindow> {
        self.window.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Per-window quota for a tier. `None` means unlimited.
    ///
    /// Quotas are `floor(budget * share)` but never below one request, so a
    /// tiny budget cannot starve a tier entirely.
    pub fn quota(&self, priority: RequestPriority) -> Option<u32> {
        priority.budget_share().map(|share| {
            let quota = (f64::from(self.config.requests_per_minute) * share).floor() as u32;
            quota.max(1)
        })
    }

    /// Minimum spacing between two admitted requests.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Admit a request now if possible. Never waits.
    pub fn try_acquire(&self, priority: RequestPriority) -> bool {
        self.check(priority).is_ok()
    }

    /// Wait until a request of this priority is admitted, or fail after `max_wait`.
    pub async fn await_acquire(
        &self,
        priority: RequestPriority,
        max_wait: Duration,
    ) -> Result<(), MarketDataError> {
        let started = Instant::now();
        let deadline = started + max_wait;

        loop {
            // Register interest before checking so a reset between the check
            // and the sleep is not lost.
            let woken = self.wake.notified();

            let denial = match self.check(priority) {
                Ok(()) => return Ok(()),
                Err(denial) => denial,
            };

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Rate limiter: {} request not admitted within {:?} (last reason: {:?})",
                    priority, max_wait, denial.reason
                );
                return Err(MarketDataError::RateLimitTimeout {
                    waited: now.duration_since(started),
                });
            }

            debug!(
                "Rate limiter: {} request denied ({:?}), waiting {:?}",
                priority,
                denial.reason,
                denial.retry_at.saturating_duration_since(now)
            );

            tokio::select! {
                _ = woken => {}
                _ = sleep_until(denial.retry_at.min(deadline)) => {}
            }
        }
    }

    fn check(&self, priority: RequestPriority) -> Result<(), Denial> {
        let now = Instant::now();
        let mut window = self.lock_window();

        if let Some(until) = window.backoff_until {
            if now < until && priority != RequestPriority::Critical {
                return Err(Denial {
                    reason: DenyReason::Backoff,
                    retry_at: until,
                });
            }
        }

        window.roll_if_elapsed(now);

        if let Some(quota) = self.quota(priority) {
            if window.requests_in_window >= quota {
                return Err(Denial {
                    reason: DenyReason::TierQuota,
                    retry_at: window.window_start + WINDOW,
                });
            }
        }

        let mut use_burst = false;
        if let Some(last) = window.last_request_time {
            if now.duration_since(last) < self.min_interval {
                if window.burst_used < self.config.burst_allowance {
                    use_burst = true;
                } else {
                    return Err(Denial {
                        reason: DenyReason::Spacing,
                        retry_at: last + self.min_interval,
                    });
                }
            }
        }

        if use_burst {
            window.burst_used += 1;
        }
        window.requests_in_window += 1;
        window.last_request_time = Some(now);
        Ok(())
    }

    /// Record a provider throttle signal and enter backoff.
    ///
    /// After the Nth consecutive signal the backoff lasts `min(2^N, 60)` seconds.
    /// Returns the backoff duration.
    pub fn report_throttled(&self) -> Duration {
        let now = Instant::now();
        let mut window = self.lock_window();

        window.consecutive_throttles = window.consecutive_throttles.saturating_add(1);
        let backoff = Duration::from_secs(
            2u64.saturating_pow(window.consecutive_throttles)
                .min(MAX_BACKOFF_SECS),
        );
        window.backoff_until = Some(now + backoff);

        warn!(
            "Rate limiter: provider throttled ({} consecutive), backing off for {:?}",
            window.consecutive_throttles, backoff
        );
        backoff
    }

    /// Record a clean success, clearing the consecutive-throttle streak.
    pub fn report_success(&self) {
        let mut window = self.lock_window();
        if window.consecutive_throttles > 0 {
            debug!(
                "Rate limiter: clean success after {} throttles, streak reset",
                window.consecutive_throttles
            );
        }
        window.consecutive_throttles = 0;
    }

    /// Clear all state and wake every waiter.
    pub fn reset(&self) {
        {
            let mut window = self.lock_window();
            *window = RateWindow::new(Instant::now());
        }
        info!("Rate limiter: state reset");
        self.wake.notify_waiters();
    }

    /// Instant the current backoff ends, if one is active.
    pub fn backoff_until(&self) -> Option<Instant> {
        let window = self.lock_window();
        window
            .backoff_until
            .filter(|until| Instant::now() < *until)
    }

    /// Time left in the current backoff (zero when none).
    pub fn backoff_remaining(&self) -> Duration {
        self.backoff_until()
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn consecutive_throttles(&self) -> u32 {
        self.lock_window().consecutive_throttles
    }

    pub fn snapshot(&self) -> RateWindowSnapshot {
        let now = Instant::now();
        let mut window = self.lock_window();
        window.roll_if_elapsed(now);
        let backoff_remaining = window
            .backoff_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        RateWindowSnapshot {
            requests_per_minute: self.config.requests_per_minute,
            requests_in_window: window.requests_in_window,
            consecutive_throttles: window.consecutive_throttles,
            backoff_remaining,
        }
    }
}

impl Default for PriorityRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn limiter(requests_per_minute: u32) -> PriorityRateLimiter {
        PriorityRateLimiter::new(RateLimitConfig {
            requests_per_minute,
            burst_allowance: 0,
        })
    }

    #[test]
    fn test_quota_is_monotonic_in_priority() {
        for rpm in [1, 7, 60, 100, 180, 3000] {
            let limiter = limiter(rpm);
            let quotas: Vec<u32> = RequestPriority::ALL
                .iter()
                .map(|p| limiter.quota(*p).unwrap_or(u32::MAX))
                .collect();
            assert!(quotas.windows(2).all(|w| w[0] <= w[1]), "rpm={rpm}: {quotas:?}");
        }
    }

    #[test]
    fn test_quota_shares() {
        let limiter = limiter(100);
        assert_eq!(limiter.quota(RequestPriority::Low), Some(40));
        assert_eq!(limiter.quota(RequestPriority::Normal), Some(60));
        assert_eq!(limiter.quota(RequestPriority::High), Some(80));
        assert_eq!(limiter.quota(RequestPriority::Critical), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_only_bounded_by_spacing() {
        let limiter = limiter(60);
        assert_eq!(limiter.min_interval(), Duration::from_secs(1));

        // 59 back-to-back critical requests, one per second: never denied by quota.
        for _ in 0..59 {
            assert!(limiter.try_acquire(RequestPriority::Critical));
            assert!(!limiter.try_acquire(RequestPriority::Critical));
            advance(Duration::from_secs(1)).await;
        }
        assert_eq!(limiter.snapshot().requests_in_window, 59);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_denies_back_to_back() {
        let limiter = limiter(60);
        assert!(limiter.try_acquire(RequestPriority::Critical));
        advance(Duration::from_millis(999)).await;
        assert!(!limiter.try_acquire(RequestPriority::Critical));
        advance(Duration::from_millis(1)).await;
        assert!(limiter.try_acquire(RequestPriority::Critical));
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_priority_throttled_first() {
        let limiter = limiter(600); // 100ms spacing, LOW quota 240
        let spacing = limiter.min_interval();

        for _ in 0..240 {
            assert!(limiter.try_acquire(RequestPriority::Low));
            advance(spacing).await;
        }
        assert!(!limiter.try_acquire(RequestPriority::Low));
        assert!(limiter.try_acquire(RequestPriority::Normal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rolls_after_sixty_seconds() {
        let limiter = limiter(2); // LOW quota floor(0.8) -> 1
        assert!(limiter.try_acquire(RequestPriority::Low));
        advance(Duration::from_secs(30)).await;
        assert!(!limiter.try_acquire(RequestPriority::Low));
        advance(Duration::from_secs(30)).await;
        assert!(limiter.try_acquire(RequestPriority::Low));
        assert_eq!(limiter.snapshot().requests_in_window, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_exponentially_and_caps() {
        let limiter = limiter(60);

        for n in 1..=7u32 {
            let observed = Instant::now();
            let backoff = limiter.report_throttled();
            let expected = Duration::from_secs(2u64.pow(n).min(60));
            assert_eq!(backoff, expected);
            assert_eq!(limiter.backoff_until(), Some(observed + expected));
            assert_eq!(limiter.consecutive_throttles(), n);
        }

        limiter.report_success();
        assert_eq!(limiter.consecutive_throttles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_admits_only_critical() {
        let limiter = limiter(60);
        limiter.report_throttled(); // 2s

        assert!(!limiter.try_acquire(RequestPriority::Low));
        assert!(!limiter.try_acquire(RequestPriority::Normal));
        assert!(!limiter.try_acquire(RequestPriority::High));
        assert!(limiter.try_acquire(RequestPriority::Critical));

        advance(Duration::from_secs(2)).await;
        assert!(limiter.try_acquire(RequestPriority::Normal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_allowance_skips_spacing() {
        let limiter = PriorityRateLimiter::new(RateLimitConfig {
            requests_per_minute: 60,
            burst_allowance: 2,
        });
        assert!(limiter.try_acquire(RequestPriority::High));
        assert!(limiter.try_acquire(RequestPriority::High));
        assert!(limiter.try_acquire(RequestPriority::High));
        assert!(!limiter.try_acquire(RequestPriority::High));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_acquire_waits_out_spacing() {
        let limiter = limiter(60);
        assert!(limiter.try_acquire(RequestPriority::Normal));

        let start = Instant::now();
        limiter
            .await_acquire(RequestPriority::Normal, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_acquire_times_out_during_backoff() {
        let limiter = limiter(60);
        for _ in 0..5 {
            limiter.report_throttled(); // 32s
        }

        let err = limiter
            .await_acquire(RequestPriority::High, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MarketDataError::RateLimitTimeout {
                waited: Duration::from_secs(10)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_wakes_waiters() {
        let limiter = std::sync::Arc::new(limiter(60));
        for _ in 0..5 {
            limiter.report_throttled();
        }

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .await_acquire(RequestPriority::Low, Duration::from_secs(60))
                    .await
            })
        };

        tokio::task::yield_now().await;
        let start = Instant::now();
        limiter.reset();
        waiter.await.unwrap().unwrap();
        assert!(start.elapsed() < Duration::from_secs(32));
        assert_eq!(limiter.backoff_remaining(), Duration::ZERO);
    }
}
