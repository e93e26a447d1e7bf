//! Six-stage pipeline driver.
//!
//! Each stage fetches records by their pre-state, fans them out over a
//! bounded worker pool, and waits for the whole batch before moving on. A
//! record's failure is converted into its terminal status at the task
//! boundary so sibling tasks always run to completion.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{stream, FutureExt, StreamExt};
use picopitch_core::{LeadStatus, OpportunityStatus};
use picopitch_db::{LeadFilter, LeadRow, OpportunityFilter, OpportunityRow};
use picopitch_llm::Invoker;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::export::DocumentExporter;
use crate::extractor::{self, ExtractionMode};
use crate::opportunity::{self, Synthesis};
use crate::store::Store;
use crate::themes::{self, ThemeMap};
use crate::{documents, solutions, ItemOutcome};

/// Which records a run may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunScope {
    /// Only leads stamped with this scrape session, and only opportunities
    /// created by this run. Later stages make a single pass.
    Session(Uuid),
    /// Every stage drains its whole backlog in pages.
    Unscoped,
}

impl RunScope {
    fn session_id(self) -> Option<Uuid> {
        match self {
            RunScope::Session(id) => Some(id),
            RunScope::Unscoped => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: &'static str,
    pub fetched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl StageReport {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            fetched: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Skipped => self.skipped += 1,
        }
    }

    fn finish(mut self, started: Instant) -> Self {
        self.elapsed = started.elapsed();
        tracing::info!(
            stage = self.name,
            fetched = self.fetched,
            succeeded = self.succeeded,
            failed = self.failed,
            skipped = self.skipped,
            elapsed_ms = u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            "stage complete"
        );
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    /// Leads picked up by the extraction stage of this run.
    pub leads_tracked: Vec<i64>,
    pub opportunities_created: Vec<i64>,
    /// Retries made by the fast and deep invokers during this run.
    pub retry_events: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    #[must_use]
    pub fn leads_processed(&self) -> usize {
        self.leads_tracked.len()
    }

    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpportunityStage {
    Validate,
    Brainstorm,
    Document,
}

impl OpportunityStage {
    fn name(self) -> &'static str {
        match self {
            OpportunityStage::Validate => "validate_opportunities",
            OpportunityStage::Brainstorm => "brainstorm_solutions",
            OpportunityStage::Document => "generate_documents",
        }
    }

    fn pre_state(self) -> OpportunityStatus {
        match self {
            OpportunityStage::Validate => OpportunityStatus::OpportunityDefined,
            OpportunityStage::Brainstorm => OpportunityStatus::OpportunityValidated,
            OpportunityStage::Document => OpportunityStatus::SolutionsBrainstormed,
        }
    }

    /// `None` leaves the record in its pre-state for a later run.
    fn failure_status(self) -> Option<OpportunityStatus> {
        match self {
            OpportunityStage::Validate => Some(OpportunityStatus::ValidationFailed),
            OpportunityStage::Brainstorm => Some(OpportunityStatus::SolutionBrainstormFailed),
            OpportunityStage::Document => None,
        }
    }
}

/// Drives leads and opportunities through every stage.
pub struct Pipeline {
    store: Arc<dyn Store>,
    /// Per-lead extraction.
    fast: Invoker,
    /// Theming, synthesis, validation, brainstorming and documents.
    deep: Invoker,
    exporter: DocumentExporter,
    config: PipelineConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        fast: Invoker,
        deep: Invoker,
        config: PipelineConfig,
    ) -> Self {
        let exporter = DocumentExporter::new(config.output_dir.clone());
        Self {
            store,
            fast,
            deep,
            exporter,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs all six stages in order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] when a stage cannot fetch its work.
    /// Per-record failures never surface here.
    pub async fn run(&self, scope: RunScope) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let retries_before = self.retry_events();
        tracing::info!(?scope, "pipeline run started");

        let mut summary = RunSummary::default();

        let (report, tracked) = self.extract_problems(scope).await?;
        summary.stages.push(report);
        summary.leads_tracked = tracked;

        let (report, groups) = self.group_domains(scope, &summary.leads_tracked).await?;
        summary.stages.push(report);

        let (report, theme_map) = self.consolidate_themes(&groups).await;
        summary.stages.push(report);

        if let Some(theme_map) = theme_map {
            let (report, created) = self.synthesize_opportunities(groups, &theme_map).await;
            summary.stages.push(report);
            summary.opportunities_created = created;
        }

        let scope_ids = match scope {
            RunScope::Session(_) => Some(summary.opportunities_created.as_slice()),
            RunScope::Unscoped => None,
        };
        for stage in [
            OpportunityStage::Validate,
            OpportunityStage::Brainstorm,
            OpportunityStage::Document,
        ] {
            let report = self.run_opportunity_stage(stage, scope_ids).await?;
            summary.stages.push(report);
        }

        summary.retry_events = self.retry_events().saturating_sub(retries_before);
        summary.elapsed = started.elapsed();
        tracing::info!(
            leads = summary.leads_processed(),
            opportunities = summary.opportunities_created.len(),
            retry_events = summary.retry_events,
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "pipeline run complete"
        );
        Ok(summary)
    }

    fn retry_events(&self) -> u64 {
        self.fast.retry_events() + self.deep.retry_events()
    }

    /// Runs `task` for every item with at most `max_concurrent_tasks` in
    /// flight. A panicking task yields `None` for its item.
    async fn fan_out<'a, T, F, Fut, O>(&self, items: &'a [T], task: F) -> Vec<(&'a T, Option<O>)>
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future<Output = O> + 'a,
    {
        stream::iter(items)
            .map(|item| {
                let fut = AssertUnwindSafe(task(item)).catch_unwind();
                async move { (item, fut.await.ok()) }
            })
            .buffer_unordered(self.config.max_concurrent_tasks.max(1))
            .collect()
            .await
    }

    // Stage 1
    async fn extract_problems(
        &self,
        scope: RunScope,
    ) -> Result<(StageReport, Vec<i64>), PipelineError> {
        let started = Instant::now();
        let mut report = StageReport::new("extract_problems");
        let mode = ExtractionMode::from_flag(self.config.use_evidence);
        let mut tracked: Vec<i64> = Vec::new();

        loop {
            let page = self
                .store
                .list_leads(&LeadFilter {
                    status: Some(LeadStatus::New),
                    session_id: scope.session_id(),
                    exclude_ids: tracked.clone(),
                    limit: Some(self.config.lead_page_size),
                    ..LeadFilter::default()
                })
                .await?;
            if page.is_empty() {
                break;
            }
            report.fetched += page.len();
            tracked.extend(page.iter().map(|lead| lead.id));

            let results = self
                .fan_out(&page, |lead| self.extract_one(lead, mode))
                .await;
            for (lead, outcome) in results {
                let outcome = match outcome {
                    Some(outcome) => outcome,
                    None => {
                        tracing::error!(lead_id = lead.id, "extraction task panicked");
                        self.mark_leads(&[lead.id], LeadStatus::ProblemExtractionFailed)
                            .await;
                        ItemOutcome::Failed
                    }
                };
                report.record(outcome);
            }
        }

        Ok((report.finish(started), tracked))
    }

    async fn extract_one(&self, lead: &LeadRow, mode: ExtractionMode) -> ItemOutcome {
        match extractor::process_lead(self.store.as_ref(), &self.fast, lead, mode).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(lead_id = lead.id, error = %e, "problem extraction failed");
                self.mark_leads(&[lead.id], LeadStatus::ProblemExtractionFailed)
                    .await;
                ItemOutcome::Failed
            }
        }
    }

    // Stage 2
    async fn group_domains(
        &self,
        scope: RunScope,
        tracked: &[i64],
    ) -> Result<(StageReport, Vec<(String, Vec<LeadRow>)>), PipelineError> {
        let started = Instant::now();
        let mut report = StageReport::new("group_domains");

        let ids = match scope {
            RunScope::Session(_) if tracked.is_empty() => {
                return Ok((report.finish(started), Vec::new()));
            }
            RunScope::Session(_) => Some(tracked.to_vec()),
            RunScope::Unscoped => None,
        };
        let leads = self
            .store
            .list_leads(&LeadFilter {
                status: Some(LeadStatus::ProblemExtracted),
                ids,
                ..LeadFilter::default()
            })
            .await?;
        report.fetched = leads.len();

        let groups = group_by_domain(leads);
        report.succeeded = groups.iter().map(|(_, members)| members.len()).sum();
        report.skipped = report.fetched - report.succeeded;
        tracing::info!(domains = groups.len(), "leads grouped by domain");
        Ok((report.finish(started), groups))
    }

    // Stage 2.5
    async fn consolidate_themes(
        &self,
        groups: &[(String, Vec<LeadRow>)],
    ) -> (StageReport, Option<ThemeMap>) {
        let started = Instant::now();
        let mut report = StageReport::new("consolidate_themes");
        if groups.is_empty() {
            return (report.finish(started), None);
        }

        let labels: Vec<String> = groups.iter().map(|(label, _)| label.clone()).collect();
        report.fetched = labels.len();
        let result =
            themes::consolidate(&self.deep, &labels, self.config.consolidation_options()).await;
        match result {
            Ok(theme_map) => {
                report.succeeded = theme_map.len();
                (report.finish(started), Some(theme_map))
            }
            Err(e) => {
                tracing::error!(error = %e, "theme consolidation failed; skipping synthesis");
                report.failed = 1;
                (report.finish(started), None)
            }
        }
    }

    // Stage 3
    async fn synthesize_opportunities(
        &self,
        groups: Vec<(String, Vec<LeadRow>)>,
        theme_map: &ThemeMap,
    ) -> (StageReport, Vec<i64>) {
        let started = Instant::now();
        let mut report = StageReport::new("synthesize_opportunities");

        let mut by_label: HashMap<String, Vec<LeadRow>> = groups.into_iter().collect();
        let mut candidates: Vec<(String, Vec<LeadRow>)> = Vec::new();
        for (theme, labels) in theme_map {
            let members: Vec<LeadRow> = labels
                .iter()
                .filter_map(|label| by_label.remove(label))
                .flatten()
                .collect();
            if members.len() >= self.config.min_leads_for_theme {
                candidates.push((theme.clone(), members));
            } else {
                tracing::debug!(
                    theme = %theme,
                    leads = members.len(),
                    min = self.config.min_leads_for_theme,
                    "theme below minimum size"
                );
            }
        }
        report.fetched = candidates.len();

        let results = self
            .fan_out(&candidates, |(theme, members)| {
                self.synthesize_one(theme, members)
            })
            .await;
        let mut created = Vec::new();
        for ((theme, members), synthesis) in results {
            let synthesis = match synthesis {
                Some(synthesis) => synthesis,
                None => {
                    tracing::error!(theme = %theme, "synthesis task panicked");
                    let ids: Vec<i64> = members.iter().map(|lead| lead.id).collect();
                    self.mark_leads(&ids, LeadStatus::ThematicAnalysisFailed)
                        .await;
                    Synthesis::Failed
                }
            };
            if let Synthesis::Created(id) = synthesis {
                created.push(id);
            }
            report.record(synthesis.outcome());
        }
        created.sort_unstable();

        (report.finish(started), created)
    }

    async fn synthesize_one(&self, theme: &str, members: &[LeadRow]) -> Synthesis {
        let result = opportunity::synthesize(
            self.store.as_ref(),
            &self.deep,
            theme,
            members,
            self.config.use_evidence,
        )
        .await;
        match result {
            Ok(synthesis) => synthesis,
            Err(e) => {
                tracing::error!(theme, error = %e, "opportunity synthesis failed");
                let ids: Vec<i64> = members.iter().map(|lead| lead.id).collect();
                self.mark_leads(&ids, LeadStatus::ThematicAnalysisFailed)
                    .await;
                Synthesis::Failed
            }
        }
    }

    // Stages 4 to 6
    async fn run_opportunity_stage(
        &self,
        stage: OpportunityStage,
        scope_ids: Option<&[i64]>,
    ) -> Result<StageReport, PipelineError> {
        let started = Instant::now();
        let mut report = StageReport::new(stage.name());
        if scope_ids.is_some_and(<[i64]>::is_empty) {
            return Ok(report.finish(started));
        }

        let page_size = match stage {
            OpportunityStage::Document => self.config.planning_page_size,
            _ => self.config.opportunity_page_size,
        };
        let mut seen: Vec<i64> = Vec::new();

        loop {
            let page = self
                .store
                .list_opportunities(&OpportunityFilter {
                    status: Some(stage.pre_state()),
                    ids: scope_ids.map(<[i64]>::to_vec),
                    exclude_ids: seen.clone(),
                    limit: if scope_ids.is_some() {
                        None
                    } else {
                        Some(page_size)
                    },
                })
                .await?;
            if page.is_empty() {
                break;
            }
            report.fetched += page.len();
            seen.extend(page.iter().map(|o| o.id));

            let results = self
                .fan_out(&page, |row| self.advance_opportunity(stage, row))
                .await;
            for (row, outcome) in results {
                let outcome = match outcome {
                    Some(outcome) => outcome,
                    None => {
                        tracing::error!(
                            opportunity_id = row.id,
                            stage = stage.name(),
                            "opportunity task panicked"
                        );
                        self.fail_opportunity(stage, row.id).await;
                        ItemOutcome::Failed
                    }
                };
                report.record(outcome);
            }

            if scope_ids.is_some() {
                break;
            }
        }

        Ok(report.finish(started))
    }

    async fn advance_opportunity(
        &self,
        stage: OpportunityStage,
        row: &OpportunityRow,
    ) -> ItemOutcome {
        let store = self.store.as_ref();
        let result = match stage {
            OpportunityStage::Validate => opportunity::validate(store, &self.deep, row).await,
            OpportunityStage::Brainstorm => solutions::brainstorm(store, &self.deep, row).await,
            OpportunityStage::Document => {
                documents::generate(
                    store,
                    &self.deep,
                    &self.exporter,
                    row,
                    self.config.use_evidence,
                )
                .await
            }
        };
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    opportunity_id = row.id,
                    stage = stage.name(),
                    error = %e,
                    "opportunity stage failed"
                );
                self.fail_opportunity(stage, row.id).await;
                ItemOutcome::Failed
            }
        }
    }

    /// Writes `status` to those of `ids` not already in a terminal status, so
    /// a failure never unbinds leads from an opportunity that was stored.
    async fn mark_leads(&self, ids: &[i64], status: LeadStatus) {
        let filter = LeadFilter {
            ids: Some(ids.to_vec()),
            ..LeadFilter::default()
        };
        let open: Vec<i64> = match self.store.list_leads(&filter).await {
            Ok(rows) => rows
                .iter()
                .filter(|lead| !lead.status.is_terminal())
                .map(|lead| lead.id)
                .collect(),
            Err(e) => {
                tracing::error!(leads = ids.len(), error = %e, "failed to read lead statuses");
                return;
            }
        };
        if open.is_empty() {
            return;
        }
        if let Err(e) = self.store.set_lead_status(&open, status).await {
            tracing::error!(
                leads = open.len(),
                status = status.as_str(),
                error = %e,
                "failed to write lead status"
            );
        }
    }

    async fn fail_opportunity(&self, stage: OpportunityStage, id: i64) {
        let Some(status) = stage.failure_status() else {
            return;
        };
        let filter = OpportunityFilter {
            ids: Some(vec![id]),
            ..OpportunityFilter::default()
        };
        match self.store.list_opportunities(&filter).await {
            Ok(rows) if rows.iter().any(|row| row.status.is_terminal()) => return,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    opportunity_id = id,
                    error = %e,
                    "failed to read opportunity status"
                );
                return;
            }
        }
        if let Err(e) = self.store.set_opportunity_status(id, status).await {
            tracing::error!(
                opportunity_id = id,
                status = status.as_str(),
                error = %e,
                "failed to write opportunity status"
            );
        }
    }
}

/// Groups leads by trimmed `problem_domain`, largest group first. Ties keep
/// first-occurrence order. Leads without a domain are dropped.
fn group_by_domain(leads: Vec<LeadRow>) -> Vec<(String, Vec<LeadRow>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<LeadRow>)> = Vec::new();
    for lead in leads {
        let Some(domain) = lead
            .problem_domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
        else {
            continue;
        };
        match index.get(&domain) {
            Some(&i) => groups[i].1.push(lead),
            None => {
                index.insert(domain.clone(), groups.len());
                groups.push((domain, vec![lead]));
            }
        }
    }
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    groups
}
