//! Explicit retry policy.
//!
//! Call sites opt in by wrapping a fallible operation and supplying the predicate
//! that decides which errors are worth another attempt.

use std::fmt::Display;
use std::thread::sleep;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A policy that never retries.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned unchanged.
    pub fn run<T, E, F, P>(&self, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && is_retryable(&err) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying",
                    );
                    if !self.delay.is_zero() {
                        sleep(self.delay);
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        tracing::error!(attempts = attempt, error = %err, "all attempts failed");
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let mut calls = 0;
        let result: Result<u32, String> = policy.run(
            |attempt| {
                calls += 1;
                if attempt < 3 {
                    Err("busy".to_string())
                } else {
                    Ok(attempt)
                }
            },
            |_| true,
        );
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[test]
    fn stops_on_non_retryable_error() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let mut calls = 0;
        let result: Result<(), String> = policy.run(
            |_| {
                calls += 1;
                Err("fatal".to_string())
            },
            |err| err != "fatal",
        );
        assert_eq!(result, Err("fatal".to_string()));
        assert_eq!(calls, 1);
    }

    #[test]
    fn returns_last_error_when_exhausted() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let result: Result<(), String> =
            policy.run(|attempt| Err(format!("failure {attempt}")), |_| true);
        assert_eq!(result, Err("failure 2".to_string()));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let mut calls = 0;
        let _: Result<(), String> = policy.run(
            |_| {
                calls += 1;
                Err("x".to_string())
            },
            |_| true,
        );
        assert_eq!(calls, 1);
    }
}
