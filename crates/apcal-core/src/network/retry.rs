//! Bounded retry for artifact transfers.
//!
//! Delays double from `base_delay` up to `max_delay`, optionally scaled by a
//! random factor in `[0.5, 1.5)`. Only errors classified as retryable by
//! [`ApcalError::is_retryable`] are attempted again.

use crate::error::{ApcalError, Result};
use rand::Rng;
use std::time::Duration;
use tracing::warn;

/// How many times, and how patiently, a transfer is attempted.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total attempts including the first. Never below one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause after the failed attempt number `failed` (0 for the first).
    pub fn delay_after(&self, failed: u32) -> Duration {
        let doubled = self
            .base_delay
            .saturating_mul(1u32.checked_shl(failed).unwrap_or(u32::MAX))
            .min(self.max_delay);
        if !self.jitter {
            return doubled;
        }
        let factor: f64 = rand::rng().random_range(0.5..1.5);
        doubled.mul_f64(factor).min(self.max_delay)
    }
}

/// What a retried transfer cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
}

/// Run `attempt` until it succeeds, fails for good, or the budget is spent.
/// Sleeps the calling thread between attempts.
pub fn retry_blocking<T>(
    config: &RetryConfig,
    mut attempt: impl FnMut() -> Result<T>,
) -> (Result<T>, RetryStats) {
    let mut stats = RetryStats::default();
    loop {
        stats.attempts += 1;
        let err: ApcalError = match attempt() {
            Ok(value) => return (Ok(value), stats),
            Err(err) => err,
        };

        if !err.is_retryable() || stats.attempts >= config.max_attempts {
            return (Err(err), stats);
        }

        let delay = config.delay_after(stats.attempts - 1);
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            stats.attempts, config.max_attempts, err, delay
        );
        stats.total_delay += delay;
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(attempts: u32) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(attempts)
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    fn timeout() -> ApcalError {
        ApcalError::Timeout {
            message: "read timed out".into(),
        }
    }

    #[test]
    fn test_delays_double_up_to_cap() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(5))
            .with_jitter(false);

        assert_eq!(config.delay_after(0), Duration::from_secs(2));
        assert_eq!(config.delay_after(1), Duration::from_secs(4));
        assert_eq!(config.delay_after(2), Duration::from_secs(5));
        assert_eq!(config.delay_after(40), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let config = RetryConfig::new().with_base_delay(Duration::from_secs(2));
        for _ in 0..50 {
            let delay = config.delay_after(0);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay < Duration::from_secs(3));
        }
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryConfig::new().with_max_attempts(0).max_attempts(), 1);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let calls = Cell::new(0);
        let (result, stats) = retry_blocking(&quick(3), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(timeout())
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.total_delay, Duration::from_millis(3));
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let (result, stats) = retry_blocking(&quick(5), || -> Result<()> {
            Err(ApcalError::DownloadFailed {
                url: "http://localhost/teff.json".into(),
                message: "HTTP 404".into(),
                retryable: false,
            })
        });

        assert!(matches!(result, Err(ApcalError::DownloadFailed { .. })));
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.total_delay, Duration::ZERO);
    }

    #[test]
    fn test_budget_exhausted() {
        let (result, stats) = retry_blocking(&quick(2), || -> Result<()> { Err(timeout()) });
        assert!(matches!(result, Err(ApcalError::Timeout { .. })));
        assert_eq!(stats.attempts, 2);
    }
}
