//! Transport-level retry policy shared by every vendor facade (§4.3).
//!
//! One outbound attempt, then up to `max_retries` retries with exponential
//! backoff starting at `base_delay`, doubling each attempt. Only genuinely
//! transient failures are retried; a `MissingCredential` or `InvalidInput`
//! burns no retry budget.

use std::fmt::Display;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use mnemo_core::error::EngineError;

pub const DEFAULT_MAX_RETRIES: usize = 2;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Retries `operation` while `should_retry(&err)` holds, doubling the delay
/// after each retry starting from `base_delay`. Errors the predicate rejects
/// are returned immediately on first failure.
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: usize,
    base_delay: Duration,
    should_retry: impl Fn(&EngineError) -> bool,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }
                if attempt < max_retries {
                    let delay = base_delay * 2u32.pow(u32::try_from(attempt).unwrap_or(u32::MAX));
                    warn_retry(&e, attempt + 1, max_retries + 1, delay);
                    sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| EngineError::Transient("retry loop produced no error".to_string())))
}

fn warn_retry(e: &impl Display, attempt: usize, total: usize, delay: Duration) {
    warn!("request failed (attempt {attempt}/{total}): {e}. retrying after {delay:?}...");
}

/// The default retry predicate (§4.3): only `Transient` failures are retried.
#[must_use]
pub const fn is_transient(e: &EngineError) -> bool {
    matches!(e, EngineError::Transient(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let result = retry_with_backoff(
            || {
                let attempts = attempts.clone();
                async move {
                    let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 3 {
                        Err(EngineError::Transient("boom".to_string()))
                    } else {
                        Ok(())
                    }
                }
            },
            2,
            Duration::from_millis(0),
            is_transient,
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: Result<(), EngineError> = retry_with_backoff(
            || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(EngineError::MissingCredential {
                        provider: "openai".to_string(),
                        missing: vec!["OPENAI_API_KEY".to_string()],
                    })
                }
            },
            2,
            Duration::from_millis(0),
            is_transient,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_then_returns_last_error() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: Result<(), EngineError> = retry_with_backoff(
            || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(EngineError::Transient("still failing".to_string()))
                }
            },
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(0),
            is_transient,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), DEFAULT_MAX_RETRIES + 1);
    }
}
