//! Opportunity synthesis from a consolidated theme, and go/no-go validation.

use picopitch_core::{LeadStatus, OpportunityStatus, Recommendation};
use picopitch_db::{LeadRow, NewOpportunity, OpportunityRow, ValidationUpdate};
use picopitch_llm::prompts::{self, OpportunityBrief};
use picopitch_llm::{parse_model_output, Invoker, ModelOutput};
use serde::Deserialize;
use serde_json::Value;

use crate::error::PipelineError;
use crate::evidence::{aggregate, EvidenceRecord};
use crate::store::Store;
use crate::ItemOutcome;

const DEFAULT_DOMAIN_RELEVANCE: &str = "General SaaS Opportunity";

#[derive(Debug, Deserialize)]
struct ThematicSummary {
    #[serde(default)]
    common_theme_description: String,
    consolidated_problem_summary: String,
    #[serde(default)]
    theme_title: String,
}

#[derive(Debug, Deserialize)]
struct OpportunityDraft {
    opportunity_description: String,
    target_user: String,
    value_proposition: String,
    #[serde(default)]
    domain_relevance: String,
    #[serde(default)]
    opportunity_title: String,
}

#[derive(Debug, Deserialize)]
struct ValidationReply {
    monetization_score: Option<Value>,
    market_size_score: Option<Value>,
    feasibility_score: Option<Value>,
    recommendation: Option<String>,
    #[serde(default)]
    justification: String,
}

/// What happened to one theme in the synthesis stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthesis {
    Created(i64),
    /// Member leads were moved to `thematic_analysis_failed`.
    Failed,
    Skipped,
}

impl Synthesis {
    #[must_use]
    pub fn outcome(self) -> ItemOutcome {
        match self {
            Synthesis::Created(_) => ItemOutcome::Succeeded,
            Synthesis::Failed => ItemOutcome::Failed,
            Synthesis::Skipped => ItemOutcome::Skipped,
        }
    }
}

/// Synthesizes one opportunity from `theme` and its member leads.
///
/// Unusable model output or a failed insert moves every member lead to
/// `thematic_analysis_failed`.
///
/// # Errors
///
/// Returns [`PipelineError`] when a model call fails or the failure status
/// itself cannot be written; the caller owns the terminal status write.
pub async fn synthesize(
    store: &dyn Store,
    invoker: &Invoker,
    theme: &str,
    leads: &[LeadRow],
    use_evidence: bool,
) -> Result<Synthesis, PipelineError> {
    let lead_ids: Vec<i64> = leads.iter().map(|lead| lead.id).collect();
    let summaries: Vec<String> = leads
        .iter()
        .filter_map(|lead| lead.problem_summary.clone())
        .filter(|summary| !summary.trim().is_empty())
        .collect();
    if summaries.is_empty() {
        tracing::warn!(theme, "theme has no problem summaries; skipping");
        return Ok(Synthesis::Skipped);
    }

    let raw = invoker
        .invoke(
            "summarize_common_pain_point",
            &prompts::thematic_summary(theme, &summaries),
        )
        .await?;
    let summary = match parse_model_output::<ThematicSummary>(&raw) {
        ModelOutput::Parsed(summary) => summary,
        ModelOutput::Malformed { reason, .. } => {
            tracing::warn!(theme, %reason, "unusable thematic summary");
            return fail_theme(store, theme, &lead_ids).await;
        }
    };
    tracing::debug!(
        theme,
        description = %summary.common_theme_description,
        "thematic summary ready"
    );

    let raw = invoker
        .invoke(
            "identify_opportunity",
            &prompts::opportunity_identification(&summary.consolidated_problem_summary, theme),
        )
        .await?;
    let draft = match parse_model_output::<OpportunityDraft>(&raw) {
        ModelOutput::Parsed(draft) => draft,
        ModelOutput::Malformed { reason, .. } => {
            tracing::warn!(theme, %reason, "unusable opportunity draft");
            return fail_theme(store, theme, &lead_ids).await;
        }
    };

    let evidence = use_evidence.then(|| {
        let records: Vec<EvidenceRecord> =
            leads.iter().filter_map(EvidenceRecord::from_lead).collect();
        aggregate(&records)
    });

    let new = NewOpportunity {
        theme_name: theme.to_string(),
        title: first_non_blank(&[
            draft.opportunity_title.as_str(),
            summary.theme_title.as_str(),
            theme,
        ]),
        problem_summary_consolidated: summary.consolidated_problem_summary,
        description: draft.opportunity_description,
        target_user: draft.target_user,
        value_proposition: draft.value_proposition,
        domain_relevance: first_non_blank(&[
            draft.domain_relevance.as_str(),
            DEFAULT_DOMAIN_RELEVANCE,
        ]),
        based_on_lead_ids: lead_ids.clone(),
        evidence,
    };

    match store.create_opportunity(&new).await {
        Ok(id) => {
            tracing::info!(
                theme,
                opportunity_id = id,
                leads = lead_ids.len(),
                "opportunity defined"
            );
            Ok(Synthesis::Created(id))
        }
        Err(e) => {
            tracing::error!(theme, error = %e, "failed to persist opportunity");
            fail_theme(store, theme, &lead_ids).await
        }
    }
}

async fn fail_theme(
    store: &dyn Store,
    theme: &str,
    lead_ids: &[i64],
) -> Result<Synthesis, PipelineError> {
    store
        .set_lead_status(lead_ids, LeadStatus::ThematicAnalysisFailed)
        .await?;
    tracing::warn!(
        theme,
        leads = lead_ids.len(),
        "member leads marked thematic_analysis_failed"
    );
    Ok(Synthesis::Failed)
}

fn first_non_blank(candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|c| c.trim())
        .find(|c| !c.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// The AI-authored fields of a stored opportunity, blank when absent.
pub(crate) fn brief(opportunity: &OpportunityRow) -> OpportunityBrief<'_> {
    OpportunityBrief {
        title: opportunity.display_title(),
        description: opportunity.description.as_deref().unwrap_or_default(),
        target_user: opportunity.target_user.as_deref().unwrap_or_default(),
        value_proposition: opportunity.value_proposition.as_deref().unwrap_or_default(),
    }
}

/// Scores `opportunity` and records the model's go/no-go decision.
///
/// Output without all three scores moves the opportunity to
/// `validation_failed`.
///
/// # Errors
///
/// Returns [`PipelineError`] when the model call or a store write fails.
pub async fn validate(
    store: &dyn Store,
    invoker: &Invoker,
    opportunity: &OpportunityRow,
) -> Result<ItemOutcome, PipelineError> {
    let consolidated = opportunity
        .problem_summary_consolidated
        .as_deref()
        .unwrap_or_default();
    let raw = invoker
        .invoke(
            "validate_opportunity",
            &prompts::opportunity_validation(brief(opportunity), consolidated),
        )
        .await?;

    let Some(update) = parse_model_output::<ValidationReply>(&raw)
        .parsed()
        .and_then(ValidationReply::into_update)
    else {
        tracing::warn!(opportunity_id = opportunity.id, "unusable validation output");
        store
            .set_opportunity_status(opportunity.id, OpportunityStatus::ValidationFailed)
            .await?;
        return Ok(ItemOutcome::Failed);
    };

    store.record_validation(opportunity.id, &update).await?;
    tracing::info!(
        opportunity_id = opportunity.id,
        recommendation = update.recommendation.as_str(),
        monetization = update.monetization_score,
        market_size = update.market_size_score,
        feasibility = update.feasibility_score,
        "opportunity validated"
    );
    Ok(ItemOutcome::Succeeded)
}

impl ValidationReply {
    fn into_update(self) -> Option<ValidationUpdate> {
        Some(ValidationUpdate {
            monetization_score: score(self.monetization_score.as_ref())?,
            market_size_score: score(self.market_size_score.as_ref())?,
            feasibility_score: score(self.feasibility_score.as_ref())?,
            recommendation: Recommendation::from_model_label(self.recommendation.as_deref()),
            justification: self.justification,
        })
    }
}

/// Reads a 1-10 score from a number or numeric string, clamping out-of-range values.
fn score(value: Option<&Value>) -> Option<i16> {
    let raw = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let clamped = raw.round().clamp(1.0, 10.0) as i16;
    Some(clamped)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scores_are_clamped_and_read_from_strings() {
        assert_eq!(score(Some(&json!(9))), Some(9));
        assert_eq!(score(Some(&json!("7"))), Some(7));
        assert_eq!(score(Some(&json!(14))), Some(10));
        assert_eq!(score(Some(&json!(0))), Some(1));
        assert_eq!(score(Some(&json!(6.6))), Some(7));
        assert_eq!(score(Some(&json!("high"))), None);
        assert_eq!(score(None), None);
    }

    #[test]
    fn model_decision_is_authoritative() {
        let reply: ValidationReply = serde_json::from_value(json!({
            "monetization_score": 9,
            "market_size_score": 2,
            "feasibility_score": 9,
            "recommendation": "Go",
            "justification": "Painful and cheap to build"
        }))
        .unwrap();
        let update = reply.into_update().unwrap();
        assert_eq!(update.recommendation, Recommendation::Go);
        assert_eq!(update.resulting_status(), OpportunityStatus::OpportunityValidated);
    }

    #[test]
    fn missing_recommendation_is_no_go() {
        let reply: ValidationReply = serde_json::from_value(json!({
            "monetization_score": 10,
            "market_size_score": 10,
            "feasibility_score": 10
        }))
        .unwrap();
        let update = reply.into_update().unwrap();
        assert_eq!(update.recommendation, Recommendation::NoGo);
    }

    #[test]
    fn missing_score_is_unusable() {
        let reply: ValidationReply = serde_json::from_value(json!({
            "monetization_score": 8,
            "feasibility_score": 8,
            "recommendation": "Go"
        }))
        .unwrap();
        assert!(reply.into_update().is_none());
    }

    #[test]
    fn title_falls_back_through_candidates() {
        assert_eq!(first_non_blank(&["  ", "Invoice Pain", "theme"]), "Invoice Pain");
        assert_eq!(first_non_blank(&["", ""]), "");
    }
}
