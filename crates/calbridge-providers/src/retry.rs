//! Bounded retry for transient calendar failures.
//!
//! Only errors whose code is retryable (network, rate limit, 5xx) are
//! retried. Credential acquisition never goes through this path.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ProviderResult;

/// Retry policy with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Backoff multiplier between retries.
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Builder: set the number of retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Builder: set backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.multiplier = multiplier;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_backoff.as_secs_f64();
        let delay = base * self.multiplier.powi(retry as i32 - 1);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }

    /// Runs `op`, retrying retryable failures up to `max_retries` times.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.backoff_delay(retry);
                    warn!(
                        operation,
                        error = %e,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::{ProviderError, ProviderErrorCode};

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default().with_backoff(
            Duration::from_secs(1),
            Duration::from_secs(3),
            2.0,
        );
        assert_eq!(policy.backoff_delay(0), Duration::ZERO);
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failure_once() {
        let attempts = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("list", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::server("503"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let attempts = AtomicU32::new(0);
        let result: ProviderResult<()> = RetryPolicy::default()
            .run("list", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::network("timeout"))
            })
            .await;

        assert_eq!(result.unwrap_err().code(), ProviderErrorCode::NetworkError);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failure() {
        let attempts = AtomicU32::new(0);
        let result: ProviderResult<()> = RetryPolicy::default()
            .run("insert", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::not_found("calendar"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
