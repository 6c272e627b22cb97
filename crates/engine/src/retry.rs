//! Bounded exponential backoff for retryable provider errors.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use powermgmt_core::config::RetryConfig;
use powermgmt_core::PowerMgmtError;

/// Retries operations that fail with a retryable [`PowerMgmtError`]
/// (contention or throttling) until `max_elapsed` has passed.
///
/// Delays double from `initial_delay` up to `max_delay`. A throttling error
/// carrying `retry_after` waits that long instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_elapsed: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_elapsed: cfg.max_elapsed,
            initial_delay: cfg.initial_delay,
            max_delay: cfg.max_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_elapsed: Duration::ZERO,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, PowerMgmtError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PowerMgmtError>>,
    {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            let delay = err.retry_after().unwrap_or_else(|| self.delay_for(attempt));
            if start.elapsed() + delay > self.max_elapsed {
                warn!(operation, attempt, error = %err, "Giving up after retries");
                return Err(err);
            }

            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retryable provider error, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_elapsed: Duration::from_millis(200),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn delays_double_up_to_max() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(6));
        assert_eq!(policy.delay_for(30), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn retries_contention_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run("start", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(PowerMgmtError::OperationInProgress("vm-01".into()))
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast()
            .run("get", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PowerMgmtError::NotFound("vm-01".into()))
            })
            .await;
        assert!(matches!(result, Err(PowerMgmtError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_when_elapsed_bound_is_reached() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::none()
            .run("stop", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PowerMgmtError::OperationInProgress("vm-01".into()))
            })
            .await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn throttling_honours_retry_after() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_elapsed: Duration::from_millis(50),
            ..fast()
        };
        // retry_after longer than the whole budget: no retry.
        let result: Result<(), _> = policy
            .run("list", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PowerMgmtError::Throttled {
                    message: "slow down".into(),
                    retry_after: Some(Duration::from_secs(5)),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
