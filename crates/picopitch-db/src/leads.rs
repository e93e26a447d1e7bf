//! Database operations for `leads`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use picopitch_core::{ExtractionResult, LeadStatus, NewLead};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::DbError;

const LEAD_COLUMNS: &str = "id, external_id, session_id, subreddit, author, title, body_text, \
     permalink, url, is_comment, parent_external_id, score, posted_at, status, \
     problem_summary, problem_domain, saas_potential_flag, frustration_level, \
     enhanced_analysis, has_evidence, created_at, updated_at";

/// A row from the `leads` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeadRow {
    pub id: i64,
    pub external_id: String,
    pub session_id: Option<Uuid>,
    pub subreddit: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub body_text: String,
    pub permalink: Option<String>,
    pub url: Option<String>,
    pub is_comment: bool,
    pub parent_external_id: Option<String>,
    pub score: i32,
    pub posted_at: Option<DateTime<Utc>>,
    #[sqlx(try_from = "String")]
    pub status: LeadStatus,
    pub problem_summary: Option<String>,
    pub problem_domain: Option<String>,
    pub saas_potential_flag: Option<String>,
    pub frustration_level: Option<String>,
    pub enhanced_analysis: Option<Json<ExtractionResult>>,
    pub has_evidence: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeadRow {
    /// The lead's extraction in normalized form: the enhanced blob when
    /// present, otherwise rebuilt from the flat columns. `None` when the lead
    /// has not been extracted.
    #[must_use]
    pub fn extraction(&self) -> Option<ExtractionResult> {
        if let Some(Json(enhanced)) = &self.enhanced_analysis {
            return Some(enhanced.clone());
        }
        self.problem_summary.as_deref().map(|summary| {
            ExtractionResult::from_legacy_fields(
                summary,
                self.problem_domain.as_deref(),
                self.frustration_level.as_deref(),
                self.saas_potential_flag.as_deref(),
            )
        })
    }
}

/// Selection criteria for [`list_leads`]. Every set field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub session_id: Option<Uuid>,
    /// Restrict to these ids.
    pub ids: Option<Vec<i64>>,
    /// Never return these ids.
    pub exclude_ids: Vec<i64>,
    pub limit: Option<i64>,
}

/// Fields written when extraction succeeds.
#[derive(Debug, Clone)]
pub struct LeadExtractionUpdate {
    pub problem_summary: String,
    pub problem_domain: String,
    pub saas_potential_flag: String,
    pub frustration_level: String,
    /// Present only for evidence-path extraction.
    pub enhanced_analysis: Option<ExtractionResult>,
}

impl LeadExtractionUpdate {
    #[must_use]
    pub fn from_extraction(result: &ExtractionResult, keep_enhanced: bool) -> Self {
        Self {
            problem_summary: result.problem_summary.clone(),
            problem_domain: result.problem_domain.clone(),
            saas_potential_flag: result.saas_potential_flag.to_string(),
            frustration_level: result.urgency_level.to_string(),
            enhanced_analysis: keep_enhanced.then(|| result.clone()),
        }
    }
}

/// Inserts or refreshes scraped leads keyed on `external_id`.
///
/// A lead seen again keeps its id and pipeline state; only its scraped
/// content, engagement score and session stamp are refreshed. Returns the
/// number of rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any upsert fails; the batch is rolled back.
pub async fn upsert_leads(
    pool: &PgPool,
    session_id: Option<Uuid>,
    leads: &[NewLead],
) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;
    let mut written = 0u64;

    for lead in leads {
        let result = sqlx::query(
            "INSERT INTO leads \
                 (external_id, session_id, subreddit, author, title, body_text, permalink, \
                  url, is_comment, parent_external_id, score, posted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (external_id) DO UPDATE SET \
                 session_id = COALESCE(EXCLUDED.session_id, leads.session_id), \
                 title      = EXCLUDED.title, \
                 body_text  = EXCLUDED.body_text, \
                 score      = EXCLUDED.score, \
                 updated_at = NOW()",
        )
        .bind(&lead.external_id)
        .bind(session_id)
        .bind(&lead.subreddit)
        .bind(&lead.author)
        .bind(&lead.title)
        .bind(&lead.body_text)
        .bind(&lead.permalink)
        .bind(&lead.url)
        .bind(lead.is_comment)
        .bind(&lead.parent_external_id)
        .bind(lead.score)
        .bind(lead.posted_at)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// Returns leads matching `filter`, ordered by `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_leads(pool: &PgPool, filter: &LeadFilter) -> Result<Vec<LeadRow>, DbError> {
    let mut query: QueryBuilder<'_, Postgres> =
        QueryBuilder::new(format!("SELECT {LEAD_COLUMNS} FROM leads WHERE TRUE"));

    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(session_id) = filter.session_id {
        query.push(" AND session_id = ").push_bind(session_id);
    }
    if let Some(ids) = &filter.ids {
        query.push(" AND id = ANY(").push_bind(ids.clone()).push(")");
    }
    if !filter.exclude_ids.is_empty() {
        query
            .push(" AND NOT (id = ANY(")
            .push_bind(filter.exclude_ids.clone())
            .push("))");
    }
    query.push(" ORDER BY id");
    if let Some(limit) = filter.limit {
        query.push(" LIMIT ").push_bind(limit);
    }

    let rows = query.build_query_as::<LeadRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Fetches a single lead by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_lead(pool: &PgPool, id: i64) -> Result<LeadRow, DbError> {
    let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1");
    let row = sqlx::query_as::<_, LeadRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;
    Ok(row)
}

/// Writes a successful extraction and moves the lead to `problem_extracted`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the lead does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_lead_extraction(
    pool: &PgPool,
    id: i64,
    update: &LeadExtractionUpdate,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE leads SET \
             problem_summary     = $1, \
             problem_domain      = $2, \
             saas_potential_flag = $3, \
             frustration_level   = $4, \
             enhanced_analysis   = $5, \
             has_evidence        = $6, \
             status              = $7, \
             updated_at          = NOW() \
         WHERE id = $8",
    )
    .bind(&update.problem_summary)
    .bind(&update.problem_domain)
    .bind(&update.saas_potential_flag)
    .bind(&update.frustration_level)
    .bind(update.enhanced_analysis.as_ref().map(Json))
    .bind(update.enhanced_analysis.is_some())
    .bind(LeadStatus::ProblemExtracted.as_str())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Moves every lead in `ids` to `status` in one statement. Returns the
/// number of rows updated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_lead_status(
    pool: &PgPool,
    ids: &[i64],
    status: LeadStatus,
) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("UPDATE leads SET status = $1, updated_at = NOW() WHERE id = ANY($2)")
        .bind(status.as_str())
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Lead counts keyed by status, optionally restricted to one session.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_leads_by_status(
    pool: &PgPool,
    session_id: Option<Uuid>,
) -> Result<BTreeMap<String, i64>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM leads \
         WHERE ($1::uuid IS NULL OR session_id = $1) \
         GROUP BY status ORDER BY status",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}
