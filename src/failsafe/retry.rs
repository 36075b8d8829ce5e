//! Retry logic with exponential backoff
//!
//! Wraps a single upstream call with retry-on-transient-failure. The
//! executor knows nothing about caching or accounts; callers throttle
//! inside the retried closure so every attempt that reaches the network
//! is paced.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::config::RetryConfig;
use crate::{Error, Result};

/// Retry policy: attempt budget and backoff shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts (first try included)
    pub max_attempts: u32,
    /// Base delay, doubled per attempt
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Uniform jitter added to each delay, `[0, jitter)`
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter: config.jitter,
        }
    }

    /// Delay before the retry following failed attempt `attempt` (0-based):
    /// `min(max_delay, base_delay * 2^attempt + jitter)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        exp.saturating_add(jitter).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

/// Execute a future with retry on transient failure.
///
/// Non-retryable errors are re-raised immediately with their identity
/// untouched; once the attempt budget is spent the last transient error
/// is re-raised.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, name: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                attempt += 1;
                if attempt >= policy.max_attempts {
                    debug!(operation = name, attempts = attempt, "retry budget exhausted");
                    return Err(e);
                }

                let delay = policy.delay_for(attempt - 1);
                debug!(
                    operation = name,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "retrying after backoff"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            jitter: Duration::from_millis(1000),
        }
    }

    #[tokio::test]
    async fn success_passes_through_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = with_retry(&policy(5), "op", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_call_retries_to_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<()> = with_retry(&policy(5), "op", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::upstream(429, "Too Many Requests"))
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Upstream { status: Some(429), .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn not_found_fails_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let start = std::time::Instant::now();
        let result: Result<()> = with_retry(&policy(5), "op", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::upstream(404, "Not Found"))
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Upstream { status: Some(404), .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // No backoff was applied
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers_mid_sequence() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = with_retry(&policy(5), "op", move || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::upstream(503, "Service Unavailable"))
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delays_grow_exponentially_and_cap() {
        let p = RetryPolicy {
            jitter: Duration::ZERO,
            ..policy(5)
        };
        assert_eq!(p.delay_for(0), Duration::from_secs(1));
        assert_eq!(p.delay_for(1), Duration::from_secs(2));
        assert_eq!(p.delay_for(2), Duration::from_secs(4));
        assert_eq!(p.delay_for(3), Duration::from_secs(8));
        assert_eq!(p.delay_for(10), Duration::from_secs(32));
    }

    #[test]
    fn jitter_stays_within_a_second() {
        let p = policy(5);
        for attempt in 0..4 {
            let base = Duration::from_secs(1 << attempt);
            for _ in 0..50 {
                let d = p.delay_for(attempt);
                assert!(d >= base, "delay {d:?} below base {base:?}");
                assert!(d < base + Duration::from_millis(1000));
                assert!(d <= Duration::from_secs(32));
            }
        }
    }
}
