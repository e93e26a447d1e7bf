//! Retry with exponential back-off for model calls.
//!
//! [`Invoker`] wraps a [`LanguageModel`] and retries only on
//! [`LlmError::RateLimited`]. Every other failure is returned on first
//! occurrence; malformed output is not a failure at this layer at all.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;
use crate::LanguageModel;

/// Attempt budget and back-off schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than 1.
    pub max_attempts: u32,
    /// Sleep before the second attempt; doubled before each later one.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Back-off before attempt `attempt + 1`, given that `attempt` (1-based) failed.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(factor)
    }
}

/// Runs `operation` until it succeeds, fails with a non-rate-limit error, or
/// the policy's attempt budget is spent.
///
/// `on_retry` is called once per scheduled retry, before sleeping.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    policy: RetryPolicy,
    mut on_retry: impl FnMut(),
    mut operation: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_rate_limited() {
                    return Err(err);
                }
                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        "rate limit persisted; retries exhausted"
                    );
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                on_retry();
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    error = %err,
                    "rate limited; retrying after back-off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// A shareable handle that applies [`RetryPolicy`] to every call and
/// counts retry events across clones.
#[derive(Clone)]
pub struct Invoker {
    model: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
    retries: Arc<AtomicU64>,
}

impl Invoker {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>, policy: RetryPolicy) -> Self {
        Self {
            model,
            policy,
            retries: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sends `prompt` and returns the raw model text.
    ///
    /// # Errors
    ///
    /// Returns the last [`LlmError::RateLimited`] once the attempt budget is
    /// spent, or any other [`LlmError`] immediately.
    pub async fn invoke(&self, operation: &str, prompt: &str) -> Result<String, LlmError> {
        retry_with_backoff(
            operation,
            self.policy,
            || {
                self.retries.fetch_add(1, Ordering::Relaxed);
            },
            || self.model.generate(prompt),
        )
        .await
    }

    /// Retry events recorded by this invoker and all of its clones.
    #[must_use]
    pub fn retry_events(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("policy", &self.policy)
            .field("retry_events", &self.retry_events())
            .finish_non_exhaustive()
    }
}
