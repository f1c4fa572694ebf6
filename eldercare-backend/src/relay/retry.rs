//! Retry with exponential backoff
//!
//! Wraps a fallible operation and re-runs it until it succeeds, the attempt
//! budget is used up, or the elapsed-time budget runs out. Delays double (by
//! `multiplier`) from `initial_interval` up to `max_interval`, with optional
//! jitter so several consumers don't retry in lockstep.

use rand::Rng;
use std::fmt::Display;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Stop retrying once this much time has passed since the first try
    pub max_elapsed: Option<Duration>,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Fraction of the delay randomly added or removed, 0.0 disables
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            max_elapsed: Some(Duration::from_secs(10)),
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based), before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base = self.initial_interval.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        Duration::from_secs_f64(base.min(self.max_interval.as_secs_f64()))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let spread = self.jitter.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
        delay.mul_f64(factor)
    }
}

#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct RetryError<E: Display> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `op` until it succeeds or the policy is exhausted
pub async fn retry<T, E, F>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match op() {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("[RETRY] '{}' succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if attempt >= max_attempts {
            return Err(RetryError { attempts: attempt, last_error: err });
        }

        let delay = policy.jittered(policy.delay_for(attempt));
        if let Some(budget) = policy.max_elapsed {
            if started.elapsed() + delay > budget {
                log::warn!("[RETRY] '{}' out of time after {} attempt(s)", label, attempt);
                return Err(RetryError { attempts: attempt, last_error: err });
            }
        }

        log::warn!(
            "[RETRY] '{}' attempt {}/{} failed: {}, retrying in {:?}",
            label,
            attempt,
            max_attempts,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            max_elapsed: None,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let d = policy.jittered(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1500));
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = retry(&fast_policy(5), "flaky", || {
            calls += 1;
            if calls < 3 { Err("busy") } else { Ok(calls) }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = retry(&fast_policy(4), "broken", || {
            calls += 1;
            Err(format!("failure {}", calls))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(err.last_error, "failure 4");
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_elapsed_budget_stops_early() {
        let policy = RetryPolicy {
            max_elapsed: Some(Duration::from_millis(1)),
            initial_interval: Duration::from_millis(50),
            ..fast_policy(10)
        };
        let mut calls = 0;
        let result: Result<(), _> = retry(&policy, "slow", || {
            calls += 1;
            Err("nope")
        })
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls, 1);
    }
}
