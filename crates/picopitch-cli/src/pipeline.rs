//! `run` command: one orchestrator pass, tracked as a `pipeline` collection run.

use std::sync::Arc;
use std::time::Duration;

use picopitch_db::DbError;
use picopitch_llm::{GeminiClient, Invoker, LanguageModel, RetryPolicy};
use picopitch_pipeline::{PgStore, Pipeline, PipelineConfig, RunScope, RunSummary};
use uuid::Uuid;

use crate::fail_run_best_effort;

fn build_invoker(
    config: &picopitch_core::AppConfig,
    api_key: &str,
    model: &str,
) -> anyhow::Result<Invoker> {
    let client = GeminiClient::with_base_url(
        api_key,
        model,
        config.llm_timeout_secs,
        &config.gemini_base_url,
    )
    .map_err(|e| anyhow::anyhow!("failed to build Gemini client for {model}: {e}"))?;
    let policy = RetryPolicy {
        max_attempts: config.llm_max_attempts,
        initial_delay: Duration::from_secs(config.llm_backoff_base_secs),
    };
    let model: Arc<dyn LanguageModel> = Arc::new(client);
    Ok(Invoker::new(model, policy))
}

/// `run --session` only accepts the `public_id` of a scrape run.
pub(crate) fn session_scope(session: Uuid, run_type: Option<&str>) -> anyhow::Result<RunScope> {
    match run_type {
        None => anyhow::bail!("no scrape session {session}"),
        Some(picopitch_db::RUN_TYPE_SCRAPE) => Ok(RunScope::Session(session)),
        Some(other) => anyhow::bail!("run {session} is a {other} run, not a scrape session"),
    }
}

async fn resolve_scope(pool: &sqlx::PgPool, session: Option<Uuid>) -> anyhow::Result<RunScope> {
    let Some(session) = session else {
        return Ok(RunScope::Unscoped);
    };
    let run_type = match picopitch_db::get_collection_run_by_public_id(pool, session).await {
        Ok(run) => Some(run.run_type),
        Err(DbError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };
    session_scope(session, run_type.as_deref())
}

pub(crate) async fn run_pipeline(
    pool: &sqlx::PgPool,
    config: &picopitch_core::AppConfig,
    session: Option<Uuid>,
) -> anyhow::Result<()> {
    let scope = resolve_scope(pool, session).await?;
    let api_key = config
        .gemini_api_key
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY is not set; cannot run the pipeline"))?;

    let fast = build_invoker(config, api_key, &config.fast_model)?;
    let deep = build_invoker(config, api_key, &config.deep_model)?;
    let store = Arc::new(PgStore::new(pool.clone()));
    let pipeline = Pipeline::new(store, fast, deep, PipelineConfig::from_app_config(config));

    let run = picopitch_db::create_collection_run(pool, picopitch_db::RUN_TYPE_PIPELINE, "cli")
        .await?;
    if let Err(e) = picopitch_db::start_collection_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, "pipeline", format!("{e:#}")).await;
        return Err(e.into());
    }

    let summary = match pipeline.run(scope).await {
        Ok(summary) => summary,
        Err(err) => {
            fail_run_best_effort(pool, run.id, "pipeline", format!("{err:#}")).await;
            return Err(err.into());
        }
    };

    let records = i32::try_from(summary.leads_processed()).unwrap_or(i32::MAX);
    if let Err(err) = picopitch_db::complete_collection_run(pool, run.id, records).await {
        fail_run_best_effort(pool, run.id, "pipeline", format!("{err:#}")).await;
        return Err(err.into());
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{:<26}{:>9}{:>11}{:>8}{:>9}{:>10}",
        "STAGE", "FETCHED", "SUCCEEDED", "FAILED", "SKIPPED", "SECONDS"
    );
    for stage in &summary.stages {
        println!(
            "{:<26}{:>9}{:>11}{:>8}{:>9}{:>10.1}",
            stage.name,
            stage.fetched,
            stage.succeeded,
            stage.failed,
            stage.skipped,
            stage.elapsed.as_secs_f64()
        );
    }
    println!();
    println!("leads processed:       {}", summary.leads_processed());
    println!(
        "opportunities created: {}",
        summary.opportunities_created.len()
    );
    println!("rate-limit retries:    {}", summary.retry_events);
    println!(
        "elapsed:               {:.1}s",
        summary.elapsed.as_secs_f64()
    );
}
