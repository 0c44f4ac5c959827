//! Retry executor for store calls.
//!
//! Only client errors reported by the store are candidates for a retry.
//! Transport and conversion errors propagate on the first failure.

use std::future::Future;
use std::time::Duration;

use tablekit_core::storage::{DataError, Result, TableName};

/// How a failing store call is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Error codes worth retrying. Empty means every client error.
    pub retryable_codes: Vec<String>,
    /// Pause between attempts. Zero disables the pause.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            retryable_codes: Vec::new(),
            delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn retry_on(mut self, code: impl Into<String>) -> Self {
        self.retryable_codes.push(code.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn is_retryable(&self, code: &str) -> bool {
        self.max_retries == 0
            || self.retryable_codes.is_empty()
            || self.retryable_codes.iter().any(|c| c == code)
    }
}

/// Runs `operation` under `policy`, making at most `max_retries + 1`
/// attempts. Without a policy the operation runs exactly once.
pub async fn execute<T, F, Fut>(
    policy: Option<&RetryPolicy>,
    table: &TableName,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_retries = policy.map_or(0, |p| p.max_retries);
    let mut attempt = 0;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(DataError::Client(error)) => error,
            Err(other) => return Err(other),
        };

        let Some(policy) = policy else {
            return Err(error.into());
        };
        if attempt >= max_retries || !policy.is_retryable(&error.code) {
            return Err(error.into());
        }

        attempt += 1;
        tracing::info!(
            code = %error.code,
            table = %table,
            attempt,
            "Error {} on table {}, retry no. {}",
            error.code,
            table,
            attempt
        );
        if !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const THROTTLED: &str = "ProvisionedThroughputExceededException";

    fn table() -> TableName {
        TableName::new("test-", "Stadiums")
    }

    async fn failing(calls: &AtomicUsize, code: &str) -> Result<u32> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(DataError::client(code, "failed"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_retries_then_raises() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(2).retry_on(THROTTLED);

        let start = tokio::time::Instant::now();
        let result = execute(Some(&policy), &table(), || failing(&calls, THROTTLED)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().code(), Some(THROTTLED));
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_no_policy_runs_once() {
        let calls = AtomicUsize::new(0);
        let result = execute(None, &table(), || failing(&calls, THROTTLED)).await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_code_outside_retryable_set_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3).retry_on(THROTTLED);

        let result = execute(Some(&policy), &table(), || {
            failing(&calls, "ValidationException")
        })
        .await;

        assert_eq!(result.unwrap_err().code(), Some("ValidationException"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_retryable_set_retries_any_code() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::default();

        let result = execute(Some(&policy), &table(), || {
            failing(&calls, "ValidationException")
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transport_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3).with_delay(Duration::ZERO);

        let result: Result<()> = execute(Some(&policy), &table(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DataError::Transport("connection reset".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(DataError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failure() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(2).with_delay(Duration::ZERO);

        let result = execute(Some(&policy), &table(), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(DataError::client(THROTTLED, "slow down"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
