//! Retry mechanism with a fixed delay between attempts
//!
//! Every remote call made during a sync goes through [`retry_with_delay`]
//! with a predicate choosing which failures are worth another attempt.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Retry a fallible async operation with a fixed delay
///
/// The operation runs at most `config.max_attempts` times. A failure for
/// which `is_retryable` returns false is returned immediately. When the
/// attempts are exhausted the last error is returned as-is.
///
/// # Example
/// ```ignore
/// let meta = retry_with_delay(
///     &config,
///     || async { store.head_object("/index.html").await },
///     retry_unless_not_found,
/// ).await;
/// ```
pub async fn retry_with_delay<T, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= config.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }

                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = config.max_attempts,
                    delay_ms = config.delay_ms,
                    error = %e,
                    "Retrying after error"
                );

                tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
            }
        }
    }
}

/// Retry every failure except a missing object
pub fn retry_unless_not_found(error: &Error) -> bool {
    !error.is_not_found()
}

/// Retry every failure
pub fn always_retry(_error: &Error) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            delay_ms: 1,
        }
    }

    #[test]
    fn test_retry_predicates() {
        assert!(retry_unless_not_found(&Error::Network(
            "connection reset".to_string()
        )));
        assert!(!retry_unless_not_found(&Error::NotFound(
            "/a.txt".to_string()
        )));
        assert!(always_retry(&Error::NotFound("/a.txt".to_string())));
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let config = fast_config(3);
        let mut calls = 0;

        let result = retry_with_delay(
            &config,
            || {
                calls += 1;
                async { Ok::<_, Error>(42) }
            },
            always_retry,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let config = fast_config(3);
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result = retry_with_delay(
            &config,
            || {
                let cc = call_count_clone.clone();
                async move {
                    let count = cc.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(Error::Network("timeout".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            },
            retry_unless_not_found,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_returns_last_error() {
        let config = fast_config(3);
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result: Result<()> = retry_with_delay(
            &config,
            || {
                let cc = call_count_clone.clone();
                async move {
                    let count = cc.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Network(format!("failure {count}")))
                }
            },
            always_retry,
        )
        .await;

        match result {
            Err(Error::Network(msg)) => assert_eq!(msg, "failure 2"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_non_retryable() {
        let config = fast_config(3);
        let mut calls = 0;

        let result: Result<()> = retry_with_delay(
            &config,
            || {
                calls += 1;
                async { Err(Error::NotFound("not found".to_string())) }
            },
            retry_unless_not_found,
        )
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls, 1); // Should not retry
    }
}
