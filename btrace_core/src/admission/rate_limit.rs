//! Client-side report rate limiting.
//!
//! Bounds the number of reports admitted per 60-second window. The window
//! is purged lazily on every check: once the *oldest* admitted timestamp is
//! more than 60 seconds behind "now", the whole window is cleared at once.
//! Admission therefore follows a burst-then-reset curve rather than a
//! per-entry sliding window.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::clock::Clock;
use crate::error::ConfigError;
use crate::protocol::types::Report;

/// Length of the rate-limit window in seconds.
pub const WINDOW_SECS: i64 = 60;

/// Reports-per-minute admission gate.
pub struct RateLimiter {
    /// `0` disables the limiter.
    reports_per_minute: usize,
    clock: Arc<dyn Clock>,
    /// Admission timestamps (seconds), oldest first.
    window: Mutex<VecDeque<i64>>,
}

impl RateLimiter {
    /**
     * Creates a limiter admitting at most `reports_per_minute` reports per
     * window. Zero disables limiting; negative values are rejected.
     */
    pub fn new(reports_per_minute: i64, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let reports_per_minute = usize::try_from(reports_per_minute)
            .map_err(|_| ConfigError::InvalidRateLimit(reports_per_minute))?;
        Ok(Self {
            reports_per_minute,
            clock,
            window: Mutex::new(VecDeque::new()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.reports_per_minute > 0
    }

    /**
     * Returns `true` when the report must be skipped. An admitted report's
     * timestamp is recorded in the window; a skipped one is not.
     */
    pub fn should_skip(&self, report: &Report) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let Ok(mut window) = self.window.lock() else {
            return false;
        };

        let now = self.clock.now_secs();
        if window.front().is_some_and(|oldest| now - oldest > WINDOW_SECS) {
            window.clear();
        }

        if window.len() >= self.reports_per_minute {
            debug!(limit = self.reports_per_minute, "report rate limit reached");
            return true;
        }

        window.push_back(report.timestamp);
        false
    }

    /// Number of reports currently counted in the window.
    pub fn window_len(&self) -> usize {
        self.window.lock().map(|w| w.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(limit: i64, clock: &ManualClock) -> RateLimiter {
        RateLimiter::new(limit, Arc::new(clock.clone())).expect("valid limit")
    }

    fn report_at(clock: &ManualClock) -> Report {
        Report::new("boom", clock.now_secs())
    }

    #[test]
    fn test_negative_limit_is_rejected() {
        let clock = ManualClock::at_secs(0);
        assert!(matches!(
            RateLimiter::new(-1, Arc::new(clock)),
            Err(ConfigError::InvalidRateLimit(-1))
        ));
    }

    #[test]
    fn test_zero_limit_always_admits() {
        let clock = ManualClock::at_secs(1_000);
        let limiter = limiter(0, &clock);
        for _ in 0..1_000 {
            assert!(!limiter.should_skip(&report_at(&clock)));
        }
        assert_eq!(limiter.window_len(), 0);
    }

    #[test]
    fn test_admits_n_then_skips() {
        for n in 1..=5 {
            let clock = ManualClock::at_secs(1_000);
            let limiter = limiter(n, &clock);
            for _ in 0..n {
                assert!(!limiter.should_skip(&report_at(&clock)));
                clock.advance_secs(1);
            }
            assert!(limiter.should_skip(&report_at(&clock)));
            assert_eq!(limiter.window_len(), n as usize);
        }
    }

    /**
     * Once the oldest entry is more than 60 seconds old the whole window is
     * cleared, so a fresh burst of N is admitted even though newer entries
     * are still inside the last minute. This is the coarse reset, not a
     * per-entry sliding window.
     */
    #[test]
    fn test_window_resets_entirely_when_oldest_ages_out() {
        let clock = ManualClock::at_secs(1_000);
        let limiter = limiter(3, &clock);

        assert!(!limiter.should_skip(&report_at(&clock)));
        clock.advance_secs(50);
        assert!(!limiter.should_skip(&report_at(&clock)));
        assert!(!limiter.should_skip(&report_at(&clock)));
        assert!(limiter.should_skip(&report_at(&clock)));

        /* 61s after the first entry, 11s after the other two */
        clock.advance_secs(11);
        for _ in 0..3 {
            assert!(!limiter.should_skip(&report_at(&clock)));
        }
        assert!(limiter.should_skip(&report_at(&clock)));
    }

    #[test]
    fn test_exactly_sixty_seconds_does_not_reset() {
        let clock = ManualClock::at_secs(1_000);
        let limiter = limiter(1, &clock);
        assert!(!limiter.should_skip(&report_at(&clock)));
        clock.advance_secs(60);
        assert!(limiter.should_skip(&report_at(&clock)));
        clock.advance_secs(1);
        assert!(!limiter.should_skip(&report_at(&clock)));
    }

    /**
     * Skipped reports are not recorded and do not extend the window.
     */
    #[test]
    fn test_skipped_reports_are_not_recorded() {
        let clock = ManualClock::at_secs(1_000);
        let limiter = limiter(2, &clock);
        assert!(!limiter.should_skip(&report_at(&clock)));
        assert!(!limiter.should_skip(&report_at(&clock)));
        for _ in 0..10 {
            assert!(limiter.should_skip(&report_at(&clock)));
        }
        assert_eq!(limiter.window_len(), 2);
    }
}
