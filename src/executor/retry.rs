//! Retry policy: pattern-based eligibility and exponential backoff.

use std::future::Future;

use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::domain::{RetryConfig, TaskResult};

/// Backoff ceiling regardless of attempt count.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Whether `error` is eligible for another attempt under `retry`.
///
/// `skip_on` dominates `retry_on`; absent config never retries; an empty or
/// absent `retry_on` retries any error. All matching is case-insensitive
/// substring containment.
pub fn should_retry(error: &str, retry: Option<&RetryConfig>) -> bool {
    let Some(retry) = retry else {
        return false;
    };
    let error_lower = error.to_lowercase();

    if let Some(skip_on) = &retry.skip_on {
        if skip_on
            .iter()
            .any(|p| error_lower.contains(&p.to_lowercase()))
        {
            return false;
        }
    }

    match &retry.retry_on {
        None => true,
        Some(patterns) if patterns.is_empty() => true,
        Some(patterns) => patterns
            .iter()
            .any(|p| error_lower.contains(&p.to_lowercase())),
    }
}

/// Delay before attempt `attempt + 1`. `attempt` is 1-based; attempt 1
/// yields `base_ms`, doubling thereafter up to [`MAX_BACKOFF_MS`].
pub fn calculate_backoff(base_ms: u64, attempt: u32) -> u64 {
    let shift = attempt.saturating_sub(1).min(63);
    base_ms.saturating_mul(1u64 << shift).min(MAX_BACKOFF_MS)
}

/// Drive `run_once` under the retry policy. The returned value is always the
/// most recent attempt's result.
pub async fn run_with_retry<F, Fut>(retry: Option<&RetryConfig>, mut run_once: F) -> TaskResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TaskResult>,
{
    let Some(retry) = retry else {
        return run_once().await;
    };

    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = run_once().await;
        if result.exit_code == 0 || result.error.is_none() {
            return result;
        }

        let error = result.error.as_deref().unwrap_or_default();
        if !should_retry(error, Some(retry)) || attempt == max_attempts {
            return result;
        }

        let backoff_ms = calculate_backoff(retry.backoff_ms, attempt);
        debug!(
            task_id = %result.id,
            attempt,
            backoff_ms,
            error = %error,
            "Task failed, retrying after backoff"
        );
        sleep(Duration::from_millis(backoff_ms)).await;
        attempt += 1;
    }
}
