//! Language-model access for the opportunity pipeline.

pub mod error;
pub mod gemini;
pub mod invoker;
pub mod output;
pub mod prompts;

use async_trait::async_trait;

pub use error::LlmError;
pub use gemini::{GeminiClient, GenerationConfig};
pub use invoker::{Invoker, RetryPolicy};
pub use output::{parse_model_output, strip_code_fence, ModelOutput};

/// A text-in, text-out model endpoint.
///
/// Implementations classify throttling as [`LlmError::RateLimited`] and do no
/// retrying of their own.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}
