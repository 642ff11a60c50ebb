//! Retry policy with exponential backoff
//!
//! Bounded strategy for transient backend failures:
//! - Attempts: 3 by default
//! - Delay: binary exponential from 200ms, capped at 5s, ±25% jitter
//! - Only `SymphonyError::is_transient` errors are retried

use crate::errors::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Default number of attempts (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff
const BASE_DELAY_MS: u64 = 200;

/// Maximum delay cap
const MAX_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Policy that never waits between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 0,
            max_delay_ms: 0,
            enable_jitter: false,
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    ///
    /// Exhaustion returns the last error unchanged.
    pub async fn execute_with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying transient failure");
                    sleep(delay).await;
                }
            }
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as f64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter;
            ((delay_ms as f64) + random_jitter).max(0.0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SymphonyError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_success_first_attempt() {
        let policy = RetryPolicy::immediate(3);
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = policy
            .execute_with_retry(move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, SymphonyError>(42)
                }
            })
            .await;

        assert_eq!(assert_ok!(result), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let policy = RetryPolicy::immediate(3);
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = policy
            .execute_with_retry(move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(SymphonyError::TextBackend("503".into()))
                    } else {
                        Ok("plan")
                    }
                }
            })
            .await;

        assert_eq!(assert_ok!(result), "plan");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let policy = RetryPolicy::immediate(3);
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<()> = policy
            .execute_with_retry(move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(SymphonyError::TextBackend("down".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(SymphonyError::TextBackend(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let policy = RetryPolicy::immediate(5);
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<()> = policy
            .execute_with_retry(move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(SymphonyError::ConfigError("bad".into()))
                }
            })
            .await;

        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::with_max_attempts(20);
        assert!(policy.calculate_delay(15) <= Duration::from_millis(MAX_DELAY_MS + MAX_DELAY_MS / 4));
    }
}
