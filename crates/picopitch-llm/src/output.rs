//! Parsing raw model text into typed values.

use serde::de::DeserializeOwned;

/// Strips an optional leading "```json" marker and trailing "```" marker,
/// then trims surrounding whitespace.
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let body = trimmed.strip_prefix("```json").unwrap_or(trimmed);
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim()
}

/// Result of interpreting model text as structured data.
///
/// Malformed output is an expected outcome, not an error: callers decide
/// whether to substitute a fallback, skip, or mark the record failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput<T> {
    Parsed(T),
    Malformed { raw: String, reason: String },
}

impl<T> ModelOutput<T> {
    #[must_use]
    pub fn parsed(self) -> Option<T> {
        match self {
            ModelOutput::Parsed(value) => Some(value),
            ModelOutput::Malformed { .. } => None,
        }
    }

    #[must_use]
    pub fn is_parsed(&self) -> bool {
        matches!(self, ModelOutput::Parsed(_))
    }
}

/// Strips any code fence and deserializes the remainder as JSON.
#[must_use]
pub fn parse_model_output<T: DeserializeOwned>(raw: &str) -> ModelOutput<T> {
    match serde_json::from_str::<T>(strip_code_fence(raw)) {
        Ok(value) => ModelOutput::Parsed(value),
        Err(e) => ModelOutput::Malformed {
            raw: raw.to_owned(),
            reason: e.to_string(),
        },
    }
}
