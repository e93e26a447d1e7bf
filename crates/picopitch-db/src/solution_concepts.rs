use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::DbError;

/// Stored shape of `solution_concepts.core_features`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreFeatures {
    pub features: Vec<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SolutionConceptRow {
    pub id: i64,
    pub opportunity_id: i64,
    pub concept_name: String,
    pub core_features: Json<CoreFeatures>,
    pub created_at: DateTime<Utc>,
}

impl SolutionConceptRow {
    /// JSON snapshot recorded on the opportunity once planning completes.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "concept_name": self.concept_name,
            "core_features": { "features": self.core_features.0.features },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSolutionConcept {
    pub concept_name: String,
    pub core_features: Vec<String>,
}

/// Inserts every concept for one opportunity in a single transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; none are kept.
pub async fn insert_solution_concepts(
    pool: &PgPool,
    opportunity_id: i64,
    concepts: &[NewSolutionConcept],
) -> Result<Vec<i64>, DbError> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(concepts.len());

    for concept in concepts {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO solution_concepts (opportunity_id, concept_name, core_features) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(opportunity_id)
        .bind(&concept.concept_name)
        .bind(Json(CoreFeatures {
            features: concept.core_features.clone(),
        }))
        .fetch_one(&mut *tx)
        .await?;
        ids.push(id);
    }

    tx.commit().await?;
    Ok(ids)
}

/// Concepts of one opportunity, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_solution_concepts(
    pool: &PgPool,
    opportunity_id: i64,
) -> Result<Vec<SolutionConceptRow>, DbError> {
    let rows = sqlx::query_as::<_, SolutionConceptRow>(
        "SELECT id, opportunity_id, concept_name, core_features, created_at \
         FROM solution_concepts WHERE opportunity_id = $1 ORDER BY id",
    )
    .bind(opportunity_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
