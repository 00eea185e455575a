//! Retry with exponential backoff for transient provider errors.
//!
//! Only errors classified transient by [`ProviderError::is_transient`]
//! (rate limits, temporary unavailability) are retried; everything else
//! propagates immediately. Delays run on the tokio clock, so tests under
//! `start_paused` advance through them without real waits.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::types::config::RetryPolicy;

/// Run `op`, retrying transient failures per the policy.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut delay = Duration::from_millis(policy.initial_delay_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);

    for attempt in 0..=policy.max_attempts {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "transient error recovered");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient provider error, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.backoff_factor).min(max_delay);
            }
            Err(e) => return Err(e),
        }
    }

    // The loop always returns from its final iteration.
    unreachable!("retry loop exited without a result")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_ms: 10,
            backoff_factor: 2.0,
            max_delay_ms: 100,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let attempts = AtomicU32::new(0);
        let result = retry_transient(&fast_policy(3), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::RateLimited("429".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: ProviderResult<()> = retry_transient(&fast_policy(3), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Auth("bad key".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_return_last_error() {
        let attempts = AtomicU32::new(0);
        let result: ProviderResult<()> = retry_transient(&fast_policy(2), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Unavailable("503".into())) }
        })
        .await;

        match result {
            Err(ProviderError::Unavailable(_)) => {}
            other => panic!("expected unavailable, got {other:?}"),
        }
        // Initial try plus two retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_means_single_try() {
        let attempts = AtomicU32::new(0);
        let _: ProviderResult<()> = retry_transient(&RetryPolicy::none(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::RateLimited("429".into())) }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
