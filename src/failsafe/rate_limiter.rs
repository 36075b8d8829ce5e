//! Rolling-window request throttle
//!
//! Tracks the timestamps of recently admitted calls and delays new ones to
//! stay inside the upstream per-minute quota. Admission is never rejected;
//! a caller over quota sleeps until the oldest tracked call ages out of
//! the window, then re-checks against the live window before appending
//! itself (other waiters may have been admitted in the meantime).
//!
//! There is no cancellation or deadline: a caller awaiting admission runs
//! to completion.

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};
use tracing::debug;

use crate::config::RateLimitConfig;

/// Delay-based admission control for outbound API calls.
pub struct RequestThrottle {
    quota: usize,
    window: Duration,
    buffer: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RequestThrottle {
    /// Create a throttle from configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(
            config.requests_per_minute as usize,
            config.window,
            config.buffer,
        )
    }

    /// Create a throttle with explicit limits.
    #[must_use]
    pub fn with_limits(quota: usize, window: Duration, buffer: Duration) -> Self {
        Self {
            quota: quota.max(1),
            window,
            buffer,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a call may proceed, then record its admission.
    ///
    /// Suspends while the trailing window is at quota; always admits
    /// eventually, trading latency for quota compliance.
    pub async fn throttle(&self) {
        loop {
            let wait = {
                let mut admitted = self.admitted.lock().await;
                let now = Instant::now();
                Self::prune(&mut admitted, now, self.window);

                if admitted.len() < self.quota {
                    admitted.push_back(now);
                    return;
                }

                let Some(&oldest) = admitted.front() else {
                    continue;
                };
                (oldest + self.window + self.buffer).saturating_duration_since(now)
            };

            debug!(wait_ms = wait.as_millis(), "rate limit reached, waiting");
            sleep(wait).await;
            // Re-check on resume: the window has moved and other waiters
            // may have claimed the freed slot.
        }
    }

    /// Advisory signal that the window is at >=80% of quota. Has no
    /// gating effect.
    pub async fn is_near_limit(&self) -> bool {
        let mut admitted = self.admitted.lock().await;
        Self::prune(&mut admitted, Instant::now(), self.window);
        admitted.len() * 5 >= self.quota * 4
    }

    /// Number of admissions currently inside the window.
    pub async fn current_usage(&self) -> usize {
        let mut admitted = self.admitted.lock().await;
        Self::prune(&mut admitted, Instant::now(), self.window);
        admitted.len()
    }

    fn prune(admitted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        // checked_sub: early in process lifetime `now` may be closer to
        // the clock epoch than the window length.
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while admitted.front().is_some_and(|&t| t <= cutoff) {
            admitted.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(quota: usize, window_ms: u64) -> RequestThrottle {
        RequestThrottle::with_limits(
            quota,
            Duration::from_millis(window_ms),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn admits_up_to_quota_without_waiting() {
        let t = throttle(3, 60_000);
        let start = Instant::now();
        for _ in 0..3 {
            t.throttle().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(t.current_usage().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn over_quota_call_waits_for_oldest_to_age_out() {
        let t = throttle(3, 60_000);
        for _ in 0..3 {
            t.throttle().await;
        }

        let start = Instant::now();
        t.throttle().await;
        let waited = start.elapsed();

        // Admitted only after the first call's timestamp left the window
        assert!(waited >= Duration::from_secs(60), "waited {waited:?}");
        assert!(waited < Duration::from_secs(61), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn never_rejects_a_burst() {
        let t = throttle(2, 1_000);
        for _ in 0..7 {
            t.throttle().await;
        }
        // 7 calls through a 2-per-second window: every call was admitted,
        // and the window never holds more than the quota
        assert!(t.current_usage().await <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_each_recheck_the_live_window() {
        use std::sync::Arc;

        let t = Arc::new(throttle(1, 1_000));
        t.throttle().await;

        let mut handles = Vec::new();
        for _ in 0..3 {
            let t = Arc::clone(&t);
            handles.push(tokio::spawn(async move {
                t.throttle().await;
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for h in handles {
            times.push(h.await.unwrap());
        }
        times.sort();

        // Quota 1/window: each admission lands in a later window, no two
        // waiters squeeze through the same freed slot.
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(900));
        }
    }

    #[tokio::test]
    async fn near_limit_is_advisory_only() {
        let t = throttle(5, 60_000);
        assert!(!t.is_near_limit().await);
        for _ in 0..4 {
            t.throttle().await;
        }
        // 4/5 == 80%
        assert!(t.is_near_limit().await);
        // Still admits immediately
        let start = Instant::now();
        t.throttle().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn window_frees_up_after_idle_period() {
        let t = throttle(2, 1_000);
        t.throttle().await;
        t.throttle().await;
        assert_eq!(t.current_usage().await, 2);

        sleep(Duration::from_millis(1_100)).await;
        assert_eq!(t.current_usage().await, 0);
    }
}
