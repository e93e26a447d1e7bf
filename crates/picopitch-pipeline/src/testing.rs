use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use picopitch_llm::{Invoker, LanguageModel, LlmError, RetryPolicy};

/// A model whose reply is computed from the prompt.
pub(crate) struct FnModel<F>(F);

#[async_trait]
impl<F> LanguageModel for FnModel<F>
where
    F: Fn(&str) -> Result<String, LlmError> + Send + Sync,
{
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        (self.0)(prompt)
    }
}

pub(crate) fn scripted_invoker<F>(reply: F) -> Invoker
where
    F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
{
    Invoker::new(
        Arc::new(FnModel(reply)),
        RetryPolicy {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
        },
    )
}

/// Labels listed between `<domain_list>` tags of a consolidation prompt.
pub(crate) fn listed_labels(prompt: &str) -> Vec<String> {
    let start = prompt.find("<domain_list>").map_or(0, |i| i + "<domain_list>".len());
    let end = prompt.find("</domain_list>").unwrap_or(prompt.len());
    prompt[start..end]
        .lines()
        .filter_map(|line| line.strip_prefix("- "))
        .map(str::to_string)
        .collect()
}
