//! Bounded retry with fixed or exponential backoff.
//!
//! Both the readiness prober and the schema migration retry through this
//! module; each call site carries its own [`RetryPolicy`] bounds. Delays are
//! derived purely from the attempt number, so jitter output never feeds back
//! into later delays.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelayStrategy {
    /// Same delay before every retry.
    Fixed,
    /// Delay grows as `delay × factor^attempt`, clamped to `max_delay`.
    Exponential { factor: f64 },
}

/// Bounded retry policy.
///
/// `max_attempts` counts total attempts, not retries: a policy with
/// `max_attempts = 1` runs the operation once and never sleeps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Unit delay (the delay before the first retry).
    pub delay: Duration,
    pub strategy: DelayStrategy,
    /// Cap for exponential growth.
    pub max_delay: Duration,
    /// Apply equal jitter: uniform in `[base/2, base]`.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Fixed-delay policy without jitter.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            strategy: DelayStrategy::Fixed,
            max_delay: delay,
            jitter: false,
        }
    }

    /// Computes the delay before retry number `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            DelayStrategy::Fixed => self.delay.min(self.max_delay),
            DelayStrategy::Exponential { factor } => {
                let max_secs = self.max_delay.as_secs_f64();
                let exp = attempt.min(i32::MAX as u32) as i32;
                let secs = self.delay.as_secs_f64() * factor.powi(exp);
                if !secs.is_finite() || secs < 0.0 || secs > max_secs {
                    self.max_delay
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        };

        if self.jitter {
            base.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
        } else {
            base
        }
    }
}

/// Runs `op` until it succeeds or the attempt budget is exhausted.
///
/// The closure receives the 1-indexed attempt number. On exhaustion the last
/// error is returned unchanged; intermediate failures are logged at `warn!`.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt == max_attempts => return Err(e),
            Err(e) => {
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("loop returns on the last attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(10, Duration::from_millis(500));
        for attempt in 0..10 {
            assert_eq!(policy.delay_for(attempt), Duration::from_millis(500));
        }
    }

    #[test]
    fn test_exponential_growth() {
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(100),
            strategy: DelayStrategy::Exponential { factor: 2.0 },
            max_delay: Duration::from_secs(30),
            jitter: false,
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_exponential_clamped_to_max() {
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(100),
            strategy: DelayStrategy::Exponential { factor: 2.0 },
            max_delay: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(policy.delay_for(10), Duration::from_secs(1));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(1000),
            strategy: DelayStrategy::Fixed,
            max_delay: Duration::from_millis(1000),
            jitter: true,
        };

        for _ in 0..100 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_millis(1));

        let result: Result<u32, &str> = retry(&policy, "test", |_attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if n < 3 { Err("not yet") } else { Ok(n) } }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempt_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(4, Duration::from_millis(1));

        let result: Result<(), &str> = retry(&policy, "test", |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("always") }
        })
        .await;

        assert_eq!(result, Err("always"));
        assert_eq!(calls.load(Ordering::SeqCst), 4, "exactly max_attempts calls");
    }

    #[tokio::test]
    async fn test_retry_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(0, Duration::from_millis(1));

        let result: Result<(), &str> = retry(&policy, "test", |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("always") }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
