//! Solution brainstorming for validated opportunities.

use picopitch_core::OpportunityStatus;
use picopitch_db::{NewSolutionConcept, OpportunityRow};
use picopitch_llm::{parse_model_output, prompts, Invoker, ModelOutput};
use serde::Deserialize;

use crate::error::PipelineError;
use crate::opportunity::brief;
use crate::store::Store;
use crate::ItemOutcome;

/// A concept needs at least this many usable features to be kept.
pub const MIN_CORE_FEATURES: usize = 3;
/// Features kept per concept.
pub const MAX_CORE_FEATURES: usize = 5;

#[derive(Debug, Deserialize)]
struct ConceptReply {
    #[serde(default)]
    concept_name: String,
    #[serde(default)]
    core_features: Vec<serde_json::Value>,
}

impl ConceptReply {
    fn into_concept(self) -> Option<NewSolutionConcept> {
        let concept_name = self.concept_name.trim().to_string();
        if concept_name.is_empty() {
            return None;
        }
        let core_features: Vec<String> = self
            .core_features
            .into_iter()
            .filter_map(|feature| match feature {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .take(MAX_CORE_FEATURES)
            .collect();
        if core_features.len() < MIN_CORE_FEATURES {
            tracing::debug!(
                concept = %concept_name,
                features = core_features.len(),
                "dropping thin concept"
            );
            return None;
        }
        Some(NewSolutionConcept {
            concept_name,
            core_features,
        })
    }
}

/// Reads a JSON array of concepts, dropping unnamed or thin entries.
fn parse_concepts(raw: &str) -> ModelOutput<Vec<NewSolutionConcept>> {
    match parse_model_output::<Vec<ConceptReply>>(raw) {
        ModelOutput::Parsed(replies) => ModelOutput::Parsed(
            replies
                .into_iter()
                .filter_map(ConceptReply::into_concept)
                .collect(),
        ),
        ModelOutput::Malformed { raw, reason } => ModelOutput::Malformed { raw, reason },
    }
}

/// Brainstorms and stores solution concepts for one validated opportunity.
///
/// Missing opportunity fields, unusable output or an empty concept list move
/// the opportunity to `solution_brainstorm_failed`.
///
/// # Errors
///
/// Returns [`PipelineError`] when the model call or a store write fails.
pub async fn brainstorm(
    store: &dyn Store,
    invoker: &Invoker,
    opportunity: &OpportunityRow,
) -> Result<ItemOutcome, PipelineError> {
    let pitch = brief(opportunity);
    if [pitch.description, pitch.target_user, pitch.value_proposition]
        .iter()
        .any(|field| field.trim().is_empty())
    {
        tracing::warn!(
            opportunity_id = opportunity.id,
            "opportunity lacks description fields for brainstorming"
        );
        return mark_failed(store, opportunity.id).await;
    }

    let raw = invoker
        .invoke("brainstorm_solutions", &prompts::solution_concepts(pitch))
        .await?;
    let concepts = match parse_concepts(&raw) {
        ModelOutput::Parsed(concepts) if !concepts.is_empty() => concepts,
        ModelOutput::Parsed(_) => {
            tracing::warn!(opportunity_id = opportunity.id, "model proposed no concepts");
            return mark_failed(store, opportunity.id).await;
        }
        ModelOutput::Malformed { reason, .. } => {
            tracing::warn!(opportunity_id = opportunity.id, %reason, "unusable concept list");
            return mark_failed(store, opportunity.id).await;
        }
    };

    let ids = store
        .insert_solution_concepts(opportunity.id, &concepts)
        .await?;
    store
        .set_opportunity_status(opportunity.id, OpportunityStatus::SolutionsBrainstormed)
        .await?;
    tracing::info!(
        opportunity_id = opportunity.id,
        concepts = ids.len(),
        "solution concepts stored"
    );
    Ok(ItemOutcome::Succeeded)
}

async fn mark_failed(
    store: &dyn Store,
    opportunity_id: i64,
) -> Result<ItemOutcome, PipelineError> {
    store
        .set_opportunity_status(opportunity_id, OpportunityStatus::SolutionBrainstormFailed)
        .await?;
    Ok(ItemOutcome::Failed)
}
