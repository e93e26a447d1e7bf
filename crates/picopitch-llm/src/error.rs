use thiserror::Error;

/// Errors surfaced by a [`crate::LanguageModel`] call.
///
/// Only [`LlmError::RateLimited`] is retried by [`crate::Invoker`]; every
/// other variant is returned to the caller on first occurrence.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider throttled the request (HTTP 429 / `RESOURCE_EXHAUSTED`).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The provider answered but reported an error, or the envelope was unusable.
    #[error("model error: {0}")]
    Model(String),

    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
}

impl LlmError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited(_))
    }
}
