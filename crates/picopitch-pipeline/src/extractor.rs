//! Structured problem extraction for a single lead.

use picopitch_core::{source_url, ExtractionResult, LeadStatus};
use picopitch_db::{LeadExtractionUpdate, LeadRow};
use picopitch_llm::prompts::{self, LeadContext};
use picopitch_llm::{parse_model_output, Invoker, LlmError, ModelOutput};
use serde_json::Value;

use crate::error::PipelineError;
use crate::store::Store;
use crate::ItemOutcome;

/// Which prompt and malformed-output policy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Summary, domain, SaaS flag and frustration only. Unparseable output
    /// yields no result.
    Base,
    /// Adds quotes, urgency and financial signals. Unparseable output is
    /// replaced by [`ExtractionResult::parse_fallback`].
    Evidence,
}

impl ExtractionMode {
    #[must_use]
    pub fn from_flag(use_evidence: bool) -> Self {
        if use_evidence {
            Self::Evidence
        } else {
            Self::Base
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Extracted(ExtractionResult),
    /// The text was blank; no model call was made.
    EmptyInput,
    /// Base-mode output that could not be read as a JSON object.
    Unparseable { raw: String },
}

/// Extracts a normalized problem record from `text`.
///
/// # Errors
///
/// Returns [`LlmError`] only when the model call itself fails (including
/// exhausted rate-limit retries). Malformed output is never an error.
pub async fn extract(
    invoker: &Invoker,
    text: &str,
    context: LeadContext<'_>,
    mode: ExtractionMode,
) -> Result<Extraction, LlmError> {
    if text.trim().is_empty() {
        return Ok(Extraction::EmptyInput);
    }

    let (operation, prompt) = match mode {
        ExtractionMode::Base => ("extract_problem", prompts::extraction_base(text)),
        ExtractionMode::Evidence => (
            "extract_problem_with_evidence",
            prompts::extraction_evidence(text, context),
        ),
    };
    let raw = invoker.invoke(operation, &prompt).await?;
    let url = source_url(context.permalink);

    let extraction = match (parse_extraction(&raw), mode) {
        (ModelOutput::Parsed(mut result), _) => {
            if url.is_some() {
                result.source_url = url;
            }
            Extraction::Extracted(result)
        }
        (ModelOutput::Malformed { raw, reason }, ExtractionMode::Base) => {
            tracing::warn!(lead = context.external_id, %reason, "unparseable extraction output");
            Extraction::Unparseable { raw }
        }
        (ModelOutput::Malformed { reason, .. }, ExtractionMode::Evidence) => {
            tracing::warn!(
                lead = context.external_id,
                %reason,
                "unparseable evidence extraction; substituting fallback"
            );
            Extraction::Extracted(ExtractionResult::parse_fallback(url))
        }
    };
    Ok(extraction)
}

/// Reads model text as a JSON object and normalizes it. Arrays, scalars and
/// non-JSON text are all malformed.
fn parse_extraction(raw: &str) -> ModelOutput<ExtractionResult> {
    match parse_model_output::<Value>(raw) {
        ModelOutput::Parsed(value @ Value::Object(_)) => match serde_json::from_value(value) {
            Ok(result) => ModelOutput::Parsed(result),
            Err(e) => ModelOutput::Malformed {
                raw: raw.to_owned(),
                reason: e.to_string(),
            },
        },
        ModelOutput::Parsed(_) => ModelOutput::Malformed {
            raw: raw.to_owned(),
            reason: "expected a JSON object".to_string(),
        },
        ModelOutput::Malformed { raw, reason } => ModelOutput::Malformed { raw, reason },
    }
}

/// Runs extraction for one stored lead and writes the outcome.
///
/// Blank leads are skipped and left in `new`. Unparseable base-mode output
/// moves the lead to `problem_extraction_failed`.
///
/// # Errors
///
/// Returns [`PipelineError`] when the model call or a store write fails; the
/// caller owns the terminal status write in that case.
pub async fn process_lead(
    store: &dyn Store,
    invoker: &Invoker,
    lead: &LeadRow,
    mode: ExtractionMode,
) -> Result<ItemOutcome, PipelineError> {
    let context = LeadContext {
        external_id: &lead.external_id,
        permalink: lead.permalink.as_deref(),
        subreddit: lead.subreddit.as_deref(),
        is_comment: lead.is_comment,
    };

    match extract(invoker, &lead.body_text, context, mode).await? {
        Extraction::Extracted(result) => {
            let update =
                LeadExtractionUpdate::from_extraction(&result, mode == ExtractionMode::Evidence);
            store.record_lead_extraction(lead.id, &update).await?;
            tracing::debug!(
                lead_id = lead.id,
                domain = %result.problem_domain,
                "problem extracted"
            );
            Ok(ItemOutcome::Succeeded)
        }
        Extraction::EmptyInput => {
            tracing::debug!(lead_id = lead.id, "lead has no text; skipping");
            Ok(ItemOutcome::Skipped)
        }
        Extraction::Unparseable { .. } => {
            store
                .set_lead_status(&[lead.id], LeadStatus::ProblemExtractionFailed)
                .await?;
            Ok(ItemOutcome::Failed)
        }
    }
}
