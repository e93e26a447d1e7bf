//! Exponential backoff for transient Reddit API failures.

use std::future::Future;
use std::time::Duration;

use crate::error::RedditError;

/// 429 responses and network failures are retried; everything else is not.
fn is_retriable(err: &RedditError) -> bool {
    matches!(err, RedditError::RateLimited { .. } | RedditError::Http(_))
}

/// `backoff_base_secs * 2^attempt`, stretched to the server's `Retry-After`.
fn retry_delay(attempt: u32, backoff_base_secs: u64, err: &RedditError) -> Duration {
    let backoff = backoff_base_secs.saturating_mul(1u64 << attempt.min(62));
    let secs = match err {
        RedditError::RateLimited { retry_after_secs } => backoff.max(*retry_after_secs),
        _ => backoff,
    };
    Duration::from_secs(secs)
}

/// Runs `operation`, retrying transient errors up to `max_retries` more
/// times. The wait before retry `n` is `backoff_base_secs * 2^(n-1)`, or the
/// server's `Retry-After` when that is longer.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, RedditError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RedditError>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retriable(&err) || attempt >= max_retries => return Err(err),
            Err(err) => err,
        };

        let delay = retry_delay(attempt, backoff_base_secs, &err);
        tracing::warn!(
            attempt,
            max_retries,
            delay_secs = delay.as_secs(),
            error = %err,
            "transient Reddit error; retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
