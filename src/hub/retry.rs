// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Retry with bounded exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Retry behavior of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts, `None` for unbounded.
    pub max_attempts: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// Startup handshake: 10 attempts, 1s doubling up to 60s.
    pub fn startup() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            max_attempts: Some(10),
        }
    }

    /// Delay that follows `delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor.max(1.0)).min(self.max_delay)
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
            max_attempts: Some(3),
        }
    }
}

/// Run `operation` until it succeeds or the attempts are exhausted.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_when(operation_name, config, operation, |_| true).await
}

/// Like [`retry`], but gives up immediately on errors `should_retry` rejects.
pub async fn retry_when<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempts > 0 {
                    info!(operation = operation_name, retries = attempts, "Operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(err) => {
                attempts += 1;

                if !should_retry(&err) {
                    warn!(operation = operation_name, error = %err, "Operation failed with a permanent error");
                    return Err(err);
                }
                if let Some(max) = config.max_attempts {
                    if attempts >= max {
                        warn!(operation = operation_name, attempts, error = %err, "Operation failed, giving up");
                        return Err(err);
                    }
                }

                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    max_attempts = ?config.max_attempts,
                    error = %err,
                    "Operation failed, retrying in {:?}",
                    delay
                );

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::error::HubError;

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, HubError> = retry("op", &RetryConfig::test(), || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let result = retry("op", &RetryConfig::test(), || {
            let counter = Arc::clone(&counter);
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if count < 3 {
                    Err(HubError::Network(format!("fail {}", count)))
                } else {
                    Ok(count)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<(), HubError> = retry("op", &RetryConfig::test(), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(HubError::Timeout(10))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_when_stops_on_permanent_error() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<(), HubError> = retry_when(
            "op",
            &RetryConfig::test(),
            || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(HubError::api("forbidden", 403))
                }
            },
            HubError::is_retryable,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            factor: 10.0,
            max_attempts: Some(5),
        };
        assert_eq!(config.next_delay(Duration::from_millis(100)), Duration::from_secs(1));
        assert_eq!(config.next_delay(Duration::from_secs(1)), Duration::from_secs(5));
    }
}
