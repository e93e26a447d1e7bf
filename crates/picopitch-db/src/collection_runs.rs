//! Database operations for `collection_runs`.
//!
//! A `scrape` run's `public_id` doubles as the session id stamped onto the
//! leads it ingested; a `pipeline` run tracks one orchestrator invocation.
//! Runs move `queued -> running -> succeeded | failed` and never backwards.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgQueryResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

pub const RUN_TYPE_SCRAPE: &str = "scrape";
pub const RUN_TYPE_PIPELINE: &str = "pipeline";

const RUN_COLUMNS: &str = "id, public_id, run_type, trigger_source, status, started_at, \
                           completed_at, records_processed, error_message, created_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Leads written for a scrape run, leads processed for a pipeline run.
    pub records_processed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An update guarded by `AND status = <expected>` touched nothing, so the
/// run was missing or in some other state.
fn require_transition(
    result: &PgQueryResult,
    id: i64,
    expected_status: &'static str,
) -> Result<(), DbError> {
    if result.rows_affected() == 0 {
        Err(DbError::InvalidCollectionRunTransition {
            id,
            expected_status,
        })
    } else {
        Ok(())
    }
}

/// Inserts a `queued` run with a fresh `public_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_collection_run(
    pool: &PgPool,
    run_type: &str,
    trigger_source: &str,
) -> Result<CollectionRunRow, DbError> {
    let row = sqlx::query_as::<_, CollectionRunRow>(&format!(
        "INSERT INTO collection_runs (public_id, run_type, trigger_source, status) \
         VALUES ($1, $2, $3, 'queued') RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(run_type)
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// `queued -> running`, stamping `started_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] unless the run is
/// `queued`.
pub async fn start_collection_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    require_transition(&result, id, "queued")
}

/// `running -> succeeded` with the final record count.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] unless the run is
/// `running`.
pub async fn complete_collection_run(
    pool: &PgPool,
    id: i64,
    records_processed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs \
         SET status = 'succeeded', completed_at = NOW(), records_processed = $2 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(records_processed)
    .execute(pool)
    .await?;

    require_transition(&result, id, "running")
}

/// `running -> failed`, keeping `error_message` for the status listing.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] unless the run is
/// `running`.
pub async fn fail_collection_run(
    pool: &PgPool,
    id: i64,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $2 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await?;

    require_transition(&result, id, "running")
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has this `id`.
pub async fn get_collection_run(pool: &PgPool, id: i64) -> Result<CollectionRunRow, DbError> {
    sqlx::query_as::<_, CollectionRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM collection_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Looks a run up by the session id its leads carry.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has this `public_id`.
pub async fn get_collection_run_by_public_id(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<CollectionRunRow, DbError> {
    sqlx::query_as::<_, CollectionRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM collection_runs WHERE public_id = $1"
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// The newest `limit` runs of every type, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_collection_runs(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<CollectionRunRow>, DbError> {
    let rows = sqlx::query_as::<_, CollectionRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM collection_runs ORDER BY created_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
