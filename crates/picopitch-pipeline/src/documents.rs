//! Planning document generation: BRD, then PRD from the BRD, then an agile
//! plan from the PRD.

use chrono::Utc;
use picopitch_core::DocumentType;
use picopitch_db::{LeadFilter, NewDocument, OpportunityRow};
use picopitch_llm::prompts::{self, ConceptBrief};
use picopitch_llm::Invoker;

use crate::error::PipelineError;
use crate::export::DocumentExporter;
use crate::opportunity::brief;
use crate::store::Store;
use crate::ItemOutcome;

/// Drafts and stores the three planning documents for one opportunity.
///
/// The first solution concept is selected. Opportunities without concepts
/// or without a source problem summary are skipped. An empty draft stops the
/// chain and leaves the opportunity in `solutions_brainstormed`.
///
/// # Errors
///
/// Returns [`PipelineError`] when a model call or a store write fails. The
/// opportunity status is left unchanged so a later run retries it.
pub async fn generate(
    store: &dyn Store,
    invoker: &Invoker,
    exporter: &DocumentExporter,
    opportunity: &OpportunityRow,
    use_evidence: bool,
) -> Result<ItemOutcome, PipelineError> {
    let concepts = store.list_solution_concepts(opportunity.id).await?;
    let Some(concept) = concepts.first() else {
        tracing::warn!(opportunity_id = opportunity.id, "no solution concepts; skipping");
        return Ok(ItemOutcome::Skipped);
    };

    let Some(pain_point) = source_problem_summary(store, opportunity).await? else {
        tracing::warn!(
            opportunity_id = opportunity.id,
            "no source problem summary; skipping"
        );
        return Ok(ItemOutcome::Skipped);
    };

    let evidence_json = if use_evidence {
        opportunity
            .evidence()
            .filter(|dossier| dossier.has_signal())
            .and_then(|dossier| serde_json::to_string_pretty(dossier).ok())
    } else {
        None
    };

    let pitch = brief(opportunity);
    let concept_brief = ConceptBrief {
        name: &concept.concept_name,
        features: &concept.core_features.0.features,
    };
    let today = Utc::now().format("%B %d, %Y").to_string();

    let mut previous = String::new();
    for document_type in DocumentType::ALL {
        let prompt = match document_type {
            DocumentType::Brd => prompts::brd(
                &today,
                &pain_point,
                pitch,
                concept_brief,
                evidence_json.as_deref(),
            ),
            DocumentType::Prd => {
                prompts::prd(&previous, pitch, concept_brief, evidence_json.as_deref())
            }
            DocumentType::AgilePlan => prompts::agile_plan(&previous),
        };
        let operation = format!("generate_{}", document_type.as_str().to_lowercase());
        let content = invoker.invoke(&operation, &prompt).await?.trim().to_string();
        if content.is_empty() {
            tracing::warn!(
                opportunity_id = opportunity.id,
                document_type = document_type.as_str(),
                "model returned an empty document; stopping"
            );
            return Ok(ItemOutcome::Failed);
        }

        let version = store
            .next_document_version(opportunity.id, document_type)
            .await?;
        let path = exporter
            .export(
                opportunity.id,
                opportunity.title.as_deref(),
                document_type,
                &content,
                version,
            )
            .await;
        store
            .insert_document(&NewDocument {
                opportunity_id: opportunity.id,
                document_type,
                version,
                content_markdown: content.clone(),
                local_file_path: path.map(|p| p.display().to_string()),
            })
            .await?;
        tracing::info!(
            opportunity_id = opportunity.id,
            document_type = document_type.as_str(),
            version,
            "document stored"
        );
        previous = content;
    }

    store
        .mark_planning_complete(opportunity.id, &concept.to_json())
        .await?;
    Ok(ItemOutcome::Succeeded)
}

/// `problem_summary` of the first lead the opportunity was built from.
async fn source_problem_summary(
    store: &dyn Store,
    opportunity: &OpportunityRow,
) -> Result<Option<String>, PipelineError> {
    let Some(&lead_id) = opportunity.based_on_lead_ids.first() else {
        return Ok(None);
    };
    let leads = store
        .list_leads(&LeadFilter {
            ids: Some(vec![lead_id]),
            limit: Some(1),
            ..LeadFilter::default()
        })
        .await?;
    Ok(leads
        .into_iter()
        .next()
        .and_then(|lead| lead.problem_summary)
        .filter(|summary| !summary.trim().is_empty()))
}
