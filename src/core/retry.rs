//! Exponential backoff for fallible delivery attempts.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::DeliveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay after the zero-based `attempt` failed:
    /// `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of
/// attempts.
///
/// Non-retriable failures (cancellation, validation, 401/403/422) are
/// returned at once without a backoff wait. A cancellation observed while
/// waiting between attempts ends the loop with [`DeliveryError::Cancelled`].
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, DeliveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>>,
{
    let attempts = config.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retriable() => return Err(err),
            Err(err) => {
                if attempt + 1 < attempts {
                    let delay = config.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Delivery attempt failed; retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                } else {
                    debug!(attempts, error = %err, "Delivery attempts exhausted");
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| DeliveryError::api("no delivery attempt was made")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn delay_doubles_and_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for(3), Duration::from_millis(5000));
        assert_eq!(config.delay_for(64), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_failure_runs_once() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), _> = with_retry(&RetryConfig::default(), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DeliveryError::api_status("bad key", 401)) }
        })
        .await;

        assert_eq!(result, Err(DeliveryError::api_status("bad key", 401)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_back_off_then_succeed() {
        let started = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let result = with_retry(&RetryConfig::default(), &cancel, || {
            let seen = Arc::clone(&seen);
            async move {
                let mut seen = seen.lock().unwrap();
                seen.push(started.elapsed());
                if seen.len() < 3 {
                    Err(DeliveryError::api_status("overloaded", 503))
                } else {
                    Ok("hello")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("hello"));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        let first_gap = seen[1] - seen[0];
        let second_gap = seen[2] - seen[1];
        assert!(first_gap >= Duration::from_millis(1000));
        assert!(first_gap < Duration::from_millis(1100));
        assert!(second_gap >= Duration::from_millis(2000));
        assert!(second_gap < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_last_failure() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_attempts: 2,
            base_delay_ms: 10,
            max_delay_ms: 10,
        };

        let result: Result<(), _> = with_retry(&config, &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(DeliveryError::api(format!("failure {n}"))) }
        })
        .await;

        assert_eq!(result, Err(DeliveryError::api("failure 1")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), _> = with_retry(&RetryConfig::default(), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DeliveryError::Cancelled) }
        })
        .await;

        assert_eq!(result, Err(DeliveryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_skips_remaining_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let started = Instant::now();

        let result: Result<(), _> = with_retry(&RetryConfig::default(), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            trigger.cancel();
            async { Err(DeliveryError::api("reset")) }
        })
        .await;

        assert_eq!(result, Err(DeliveryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }
}
