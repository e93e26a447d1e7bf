//! Database operations for `opportunities`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use picopitch_core::{EvidenceDossier, LeadStatus, OpportunityStatus, Recommendation};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{to_i32, DbError};

const OPPORTUNITY_COLUMNS: &str = "id, theme_name, title, problem_summary_consolidated, \
     description, target_user, value_proposition, domain_relevance, status, \
     monetization_score, market_size_score, feasibility_score, recommendation, justification, \
     evidence, total_posts_analyzed, pain_point_frequency, based_on_lead_ids, \
     selected_concept, created_at, updated_at";

/// A row from the `opportunities` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OpportunityRow {
    pub id: i64,
    pub theme_name: String,
    pub title: Option<String>,
    pub problem_summary_consolidated: Option<String>,
    pub description: Option<String>,
    pub target_user: Option<String>,
    pub value_proposition: Option<String>,
    pub domain_relevance: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: OpportunityStatus,
    pub monetization_score: Option<i16>,
    pub market_size_score: Option<i16>,
    pub feasibility_score: Option<i16>,
    pub recommendation: Option<String>,
    pub justification: Option<String>,
    pub evidence: Option<Json<EvidenceDossier>>,
    pub total_posts_analyzed: i32,
    pub pain_point_frequency: i32,
    pub based_on_lead_ids: Vec<i64>,
    pub selected_concept: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OpportunityRow {
    /// Display title, falling back to the theme the opportunity came from.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.theme_name)
    }

    #[must_use]
    pub fn evidence(&self) -> Option<&EvidenceDossier> {
        self.evidence.as_ref().map(|Json(dossier)| dossier)
    }
}

/// Fields of a freshly synthesized opportunity.
#[derive(Debug, Clone)]
pub struct NewOpportunity {
    pub theme_name: String,
    pub title: String,
    pub problem_summary_consolidated: String,
    pub description: String,
    pub target_user: String,
    pub value_proposition: String,
    pub domain_relevance: String,
    pub based_on_lead_ids: Vec<i64>,
    pub evidence: Option<EvidenceDossier>,
}

#[derive(Debug, Clone, Default)]
pub struct OpportunityFilter {
    pub status: Option<OpportunityStatus>,
    pub ids: Option<Vec<i64>>,
    pub exclude_ids: Vec<i64>,
    pub limit: Option<i64>,
}

/// Scores and decision written by the validation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationUpdate {
    pub monetization_score: i16,
    pub market_size_score: i16,
    pub feasibility_score: i16,
    pub recommendation: Recommendation,
    pub justification: String,
}

impl ValidationUpdate {
    /// `opportunity_validated` on Go, `opportunity_rejected` otherwise.
    #[must_use]
    pub fn resulting_status(&self) -> OpportunityStatus {
        match self.recommendation {
            Recommendation::Go => OpportunityStatus::OpportunityValidated,
            Recommendation::NoGo => OpportunityStatus::OpportunityRejected,
        }
    }
}

/// Inserts an opportunity in `opportunity_defined` and moves its member
/// leads to `opportunity_created`, in one transaction. Returns the new id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement fails; nothing is written.
pub async fn create_opportunity(pool: &PgPool, new: &NewOpportunity) -> Result<i64, DbError> {
    let (total_posts, frequency) = match &new.evidence {
        Some(dossier) => (
            to_i32("total_posts_analyzed", dossier.total_posts_analyzed)?,
            to_i32("pain_point_frequency", dossier.pain_point_frequency)?,
        ),
        None => (0, 0),
    };

    let mut tx = pool.begin().await?;

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO opportunities \
             (theme_name, title, problem_summary_consolidated, description, target_user, \
              value_proposition, domain_relevance, status, evidence, total_posts_analyzed, \
              pain_point_frequency, based_on_lead_ids) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING id",
    )
    .bind(&new.theme_name)
    .bind(&new.title)
    .bind(&new.problem_summary_consolidated)
    .bind(&new.description)
    .bind(&new.target_user)
    .bind(&new.value_proposition)
    .bind(&new.domain_relevance)
    .bind(OpportunityStatus::OpportunityDefined.as_str())
    .bind(new.evidence.as_ref().map(Json))
    .bind(total_posts)
    .bind(frequency)
    .bind(&new.based_on_lead_ids)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE leads SET status = $1, updated_at = NOW() WHERE id = ANY($2)")
        .bind(LeadStatus::OpportunityCreated.as_str())
        .bind(&new.based_on_lead_ids)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(id)
}

/// Returns opportunities matching `filter`, ordered by `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_opportunities(
    pool: &PgPool,
    filter: &OpportunityFilter,
) -> Result<Vec<OpportunityRow>, DbError> {
    let mut query: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
        "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities WHERE TRUE"
    ));

    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
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

    let rows = query
        .build_query_as::<OpportunityRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Fetches a single opportunity by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_opportunity(pool: &PgPool, id: i64) -> Result<OpportunityRow, DbError> {
    let sql = format!("SELECT {OPPORTUNITY_COLUMNS} FROM opportunities WHERE id = $1");
    let row = sqlx::query_as::<_, OpportunityRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;
    Ok(row)
}

/// Stores validation scores and moves the opportunity to the status implied
/// by the recommendation.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the opportunity does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_validation(
    pool: &PgPool,
    id: i64,
    update: &ValidationUpdate,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE opportunities SET \
             monetization_score = $1, \
             market_size_score  = $2, \
             feasibility_score  = $3, \
             recommendation     = $4, \
             justification      = $5, \
             status             = $6, \
             updated_at         = NOW() \
         WHERE id = $7",
    )
    .bind(update.monetization_score)
    .bind(update.market_size_score)
    .bind(update.feasibility_score)
    .bind(update.recommendation.as_str())
    .bind(&update.justification)
    .bind(update.resulting_status().as_str())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the opportunity does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_opportunity_status(
    pool: &PgPool,
    id: i64,
    status: OpportunityStatus,
) -> Result<(), DbError> {
    let result =
        sqlx::query("UPDATE opportunities SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Records the concept the planning documents were drafted from and moves
/// the opportunity to `planning_documents_generated`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the opportunity does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_planning_complete(
    pool: &PgPool,
    id: i64,
    selected_concept: &serde_json::Value,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE opportunities \
         SET selected_concept = $1, status = $2, updated_at = NOW() \
         WHERE id = $3",
    )
    .bind(Json(selected_concept))
    .bind(OpportunityStatus::PlanningDocumentsGenerated.as_str())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Opportunity counts keyed by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_opportunities_by_status(
    pool: &PgPool,
) -> Result<BTreeMap<String, i64>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM opportunities GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}
