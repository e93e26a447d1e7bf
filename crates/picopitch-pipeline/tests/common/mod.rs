#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use picopitch_core::{DocumentType, LeadStatus, OpportunityStatus};
use picopitch_db::{
    CoreFeatures, DbError, DocumentRow, LeadExtractionUpdate, LeadFilter, LeadRow, NewDocument,
    NewOpportunity, NewSolutionConcept, OpportunityFilter, OpportunityRow, SolutionConceptRow,
    ValidationUpdate,
};
use picopitch_llm::{Invoker, LanguageModel, LlmError, RetryPolicy};
use picopitch_pipeline::Store;
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryState {
    pub leads: Vec<LeadRow>,
    pub opportunities: Vec<OpportunityRow>,
    pub concepts: Vec<SolutionConceptRow>,
    pub documents: Vec<DocumentRow>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn opportunity_mut(&mut self, id: i64) -> Result<&mut OpportunityRow, DbError> {
        self.opportunities
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(DbError::NotFound)
    }
}

/// In-memory [`Store`] with the same filter and ordering rules as Postgres.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    /// `create_opportunity` returns an error instead of writing.
    pub reject_opportunities: AtomicBool,
    /// `create_opportunity` writes, then panics.
    pub panic_after_opportunity: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn seed_lead(&self, body: &str, session_id: Option<Uuid>) -> i64 {
        let mut state = self.state();
        let id = state.next_id();
        state.leads.push(LeadRow {
            id,
            external_id: format!("t3_{id:04}"),
            session_id,
            subreddit: Some("smallbusiness".to_string()),
            author: Some(format!("user{id}")),
            title: Some(format!("Post {id}")),
            body_text: body.to_string(),
            permalink: Some(format!("/r/smallbusiness/comments/{id:04}/post/")),
            url: None,
            is_comment: false,
            parent_external_id: None,
            score: 10,
            posted_at: None,
            status: LeadStatus::New,
            problem_summary: None,
            problem_domain: None,
            saas_potential_flag: None,
            frustration_level: None,
            enhanced_analysis: None,
            has_evidence: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        id
    }

    fn insert_opportunity(&self, new: &NewOpportunity) -> i64 {
        let mut state = self.state();
        let id = state.next_id();
        let (total, frequency) = new.evidence.as_ref().map_or((0, 0), |d| {
            (
                i32::try_from(d.total_posts_analyzed).unwrap(),
                i32::try_from(d.pain_point_frequency).unwrap(),
            )
        });
        state.opportunities.push(OpportunityRow {
            id,
            theme_name: new.theme_name.clone(),
            title: Some(new.title.clone()),
            problem_summary_consolidated: Some(new.problem_summary_consolidated.clone()),
            description: Some(new.description.clone()),
            target_user: Some(new.target_user.clone()),
            value_proposition: Some(new.value_proposition.clone()),
            domain_relevance: Some(new.domain_relevance.clone()),
            status: OpportunityStatus::OpportunityDefined,
            monetization_score: None,
            market_size_score: None,
            feasibility_score: None,
            recommendation: None,
            justification: None,
            evidence: new.evidence.clone().map(Json),
            total_posts_analyzed: total,
            pain_point_frequency: frequency,
            based_on_lead_ids: new.based_on_lead_ids.clone(),
            selected_concept: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        for lead in state
            .leads
            .iter_mut()
            .filter(|l| new.based_on_lead_ids.contains(&l.id))
        {
            lead.status = LeadStatus::OpportunityCreated;
        }
        id
    }

    pub fn lead_status(&self, id: i64) -> LeadStatus {
        self.state()
            .leads
            .iter()
            .find(|l| l.id == id)
            .map(|l| l.status)
            .unwrap()
    }

    pub fn opportunity(&self, id: i64) -> OpportunityRow {
        self.state()
            .opportunities
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .unwrap()
    }
}

fn lead_matches(lead: &LeadRow, filter: &LeadFilter) -> bool {
    filter.status.map_or(true, |s| lead.status == s)
        && filter.session_id.map_or(true, |s| lead.session_id == Some(s))
        && filter.ids.as_ref().map_or(true, |ids| ids.contains(&lead.id))
        && !filter.exclude_ids.contains(&lead.id)
}

fn opportunity_matches(opportunity: &OpportunityRow, filter: &OpportunityFilter) -> bool {
    filter.status.map_or(true, |s| opportunity.status == s)
        && filter
            .ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&opportunity.id))
        && !filter.exclude_ids.contains(&opportunity.id)
}

fn limited<T>(rows: Vec<T>, limit: Option<i64>) -> Vec<T> {
    match limit {
        Some(n) => rows
            .into_iter()
            .take(usize::try_from(n).unwrap())
            .collect(),
        None => rows,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<LeadRow>, DbError> {
        let rows = self
            .state()
            .leads
            .iter()
            .filter(|l| lead_matches(l, filter))
            .cloned()
            .collect();
        Ok(limited(rows, filter.limit))
    }

    async fn record_lead_extraction(
        &self,
        lead_id: i64,
        update: &LeadExtractionUpdate,
    ) -> Result<(), DbError> {
        let mut state = self.state();
        let lead = state
            .leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or(DbError::NotFound)?;
        lead.problem_summary = Some(update.problem_summary.clone());
        lead.problem_domain = Some(update.problem_domain.clone());
        lead.saas_potential_flag = Some(update.saas_potential_flag.clone());
        lead.frustration_level = Some(update.frustration_level.clone());
        lead.enhanced_analysis = update.enhanced_analysis.clone().map(Json);
        lead.has_evidence = update.enhanced_analysis.is_some();
        lead.status = LeadStatus::ProblemExtracted;
        Ok(())
    }

    async fn set_lead_status(&self, lead_ids: &[i64], status: LeadStatus) -> Result<u64, DbError> {
        let mut updated = 0;
        for lead in self
            .state()
            .leads
            .iter_mut()
            .filter(|l| lead_ids.contains(&l.id))
        {
            lead.status = status;
            updated += 1;
        }
        Ok(updated)
    }

    async fn create_opportunity(&self, new: &NewOpportunity) -> Result<i64, DbError> {
        if self.reject_opportunities.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        let id = self.insert_opportunity(new);
        assert!(
            !self.panic_after_opportunity.load(Ordering::SeqCst),
            "opportunity {id} written, then the task died"
        );
        Ok(id)
    }

    async fn list_opportunities(
        &self,
        filter: &OpportunityFilter,
    ) -> Result<Vec<OpportunityRow>, DbError> {
        let rows = self
            .state()
            .opportunities
            .iter()
            .filter(|o| opportunity_matches(o, filter))
            .cloned()
            .collect();
        Ok(limited(rows, filter.limit))
    }

    async fn record_validation(
        &self,
        opportunity_id: i64,
        update: &ValidationUpdate,
    ) -> Result<(), DbError> {
        let mut state = self.state();
        let row = state.opportunity_mut(opportunity_id)?;
        row.monetization_score = Some(update.monetization_score);
        row.market_size_score = Some(update.market_size_score);
        row.feasibility_score = Some(update.feasibility_score);
        row.recommendation = Some(update.recommendation.as_str().to_string());
        row.justification = Some(update.justification.clone());
        row.status = update.resulting_status();
        Ok(())
    }

    async fn set_opportunity_status(
        &self,
        opportunity_id: i64,
        status: OpportunityStatus,
    ) -> Result<(), DbError> {
        self.state().opportunity_mut(opportunity_id)?.status = status;
        Ok(())
    }

    async fn insert_solution_concepts(
        &self,
        opportunity_id: i64,
        concepts: &[NewSolutionConcept],
    ) -> Result<Vec<i64>, DbError> {
        let mut state = self.state();
        let mut ids = Vec::new();
        for concept in concepts {
            let id = state.next_id();
            state.concepts.push(SolutionConceptRow {
                id,
                opportunity_id,
                concept_name: concept.concept_name.clone(),
                core_features: Json(CoreFeatures {
                    features: concept.core_features.clone(),
                }),
                created_at: Utc::now(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn list_solution_concepts(
        &self,
        opportunity_id: i64,
    ) -> Result<Vec<SolutionConceptRow>, DbError> {
        Ok(self
            .state()
            .concepts
            .iter()
            .filter(|c| c.opportunity_id == opportunity_id)
            .cloned()
            .collect())
    }

    async fn next_document_version(
        &self,
        opportunity_id: i64,
        document_type: DocumentType,
    ) -> Result<i32, DbError> {
        let existing = self
            .state()
            .documents
            .iter()
            .filter(|d| d.opportunity_id == opportunity_id && d.document_type == document_type)
            .count();
        Ok(i32::try_from(existing).unwrap() + 1)
    }

    async fn insert_document(&self, document: &NewDocument) -> Result<i64, DbError> {
        let mut state = self.state();
        let id = state.next_id();
        state.documents.push(DocumentRow {
            id,
            opportunity_id: document.opportunity_id,
            document_type: document.document_type,
            version: document.version,
            content_markdown: document.content_markdown.clone(),
            local_file_path: document.local_file_path.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn mark_planning_complete(
        &self,
        opportunity_id: i64,
        selected_concept: &serde_json::Value,
    ) -> Result<(), DbError> {
        let mut state = self.state();
        let row = state.opportunity_mut(opportunity_id)?;
        row.selected_concept = Some(Json(selected_concept.clone()));
        row.status = OpportunityStatus::PlanningDocumentsGenerated;
        Ok(())
    }
}

/// A model whose reply is computed from the prompt.
pub struct ScriptedModel<F>(pub F);

#[async_trait]
impl<F> LanguageModel for ScriptedModel<F>
where
    F: Fn(&str) -> Result<String, LlmError> + Send + Sync,
{
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        (self.0)(prompt)
    }
}

pub fn invoker<F>(reply: F) -> Invoker
where
    F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
{
    Invoker::new(
        Arc::new(ScriptedModel(reply)),
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::ZERO,
        },
    )
}

/// Text between the first `<tag>` and `</tag>` in `prompt`.
pub fn tag_text<'a>(prompt: &'a str, tag: &str) -> &'a str {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let Some(start) = prompt.find(&open).map(|i| i + open.len()) else {
        return "";
    };
    let end = prompt[start..].find(&close).map_or(prompt.len(), |i| start + i);
    &prompt[start..end]
}

pub fn listed_labels(prompt: &str) -> Vec<String> {
    tag_text(prompt, "domain_list")
        .lines()
        .filter_map(|line| line.strip_prefix("- "))
        .map(str::to_string)
        .collect()
}

/// Domain the scripted extractor assigns to a lead body: the text before
/// the first `:`.
pub fn domain_of(body: &str) -> &str {
    body.split(':').next().unwrap_or(body).trim()
}

/// A well-behaved model for every pipeline prompt. Extraction answers are
/// derived from the lead text, consolidation keeps each label as its own
/// theme, and validation returns the 9/2/9 Go verdict in a fenced block.
pub fn happy_model(prompt: &str) -> Result<String, LlmError> {
    if prompt.contains("<extraction_task>") || prompt.contains("<analysis_task>") {
        let body = tag_text(prompt, "raw_text");
        return Ok(serde_json::json!({
            "problem_summary": body,
            "problem_domain": domain_of(body),
            "urgency_level": "High",
            "frustration_level": "High",
            "saas_potential_flag": "Yes",
            "supporting_quotes": [{"text": body, "context": "post body"}],
            "financial_indicators": {
                "amounts_mentioned": ["$200/month"],
                "willing_to_pay": "Yes",
                "cost_of_problem": "5 hours a week"
            }
        })
        .to_string());
    }
    if prompt.contains("<theme_consolidation_task>") {
        let map: serde_json::Map<String, serde_json::Value> = listed_labels(prompt)
            .into_iter()
            .map(|label| (label.clone(), serde_json::json!([label])))
            .collect();
        return Ok(serde_json::Value::Object(map).to_string());
    }
    if prompt.contains("<thematic_analysis_task>") {
        let theme = tag_text(prompt, "problem_domain");
        return Ok(serde_json::json!({
            "common_theme_description": format!("People struggle with {theme}"),
            "consolidated_problem_summary": format!("Manual work around {theme}"),
            "theme_title": format!("{theme} Pain")
        })
        .to_string());
    }
    if prompt.contains("<opportunity_analysis>") {
        return Ok(r#"{
            "opportunity_description": "Automate the tedious parts",
            "target_user": "Freelancers",
            "value_proposition": "Hours saved every week",
            "domain_relevance": "Finance",
            "opportunity_title": "ChaseLess"
        }"#
        .to_string());
    }
    if prompt.contains("<opportunity_validation_task>") {
        return Ok("```json\n{\"monetization_score\": 9, \"market_size_score\": 2, \
                   \"feasibility_score\": 9, \"recommendation\": \"Go\", \
                   \"justification\": \"Painful and cheap to build\"}\n```"
            .to_string());
    }
    if prompt.contains("<solution_brainstorming>") {
        return Ok(r#"[
            {"concept_name": "InvoiceBot", "core_features": ["Reminders", "Dashboards", "Sync"]},
            {"concept_name": "PayNudge", "core_features": ["SMS nudges", "Templates", "Escalation"]}
        ]"#
        .to_string());
    }
    if prompt.contains("<brd_task>") {
        return Ok("# Business Requirements\n\nScope.".to_string());
    }
    if prompt.contains("<prd_task>") {
        return Ok("# Product Requirements\n\nStories.".to_string());
    }
    if prompt.contains("<agile_breakdown_task>") {
        return Ok("# Agile Plan\n\nSprint 1.".to_string());
    }
    Err(LlmError::Model(format!("unexpected prompt: {prompt}")))
}

pub fn scratch_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "picopitch-pipeline-{name}-{}-{}",
        std::process::id(),
        Uuid::new_v4().simple()
    ))
}
