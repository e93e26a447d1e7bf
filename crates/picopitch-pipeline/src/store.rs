//! Persistence seam consumed by the pipeline stages.
//!
//! [`PgStore`] forwards to `picopitch-db`; tests substitute an in-memory
//! implementation with the same filter semantics.

use async_trait::async_trait;
use picopitch_core::{DocumentType, LeadStatus, OpportunityStatus};
use picopitch_db::{
    DbError, LeadExtractionUpdate, LeadFilter, LeadRow, NewDocument, NewOpportunity,
    NewSolutionConcept, OpportunityFilter, OpportunityRow, SolutionConceptRow, ValidationUpdate,
};
use sqlx::PgPool;

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<LeadRow>, DbError>;

    async fn record_lead_extraction(
        &self,
        lead_id: i64,
        update: &LeadExtractionUpdate,
    ) -> Result<(), DbError>;

    async fn set_lead_status(&self, lead_ids: &[i64], status: LeadStatus) -> Result<u64, DbError>;

    /// Inserts the opportunity and moves its member leads to
    /// `opportunity_created` as one unit.
    async fn create_opportunity(&self, opportunity: &NewOpportunity) -> Result<i64, DbError>;

    async fn list_opportunities(
        &self,
        filter: &OpportunityFilter,
    ) -> Result<Vec<OpportunityRow>, DbError>;

    async fn record_validation(
        &self,
        opportunity_id: i64,
        update: &ValidationUpdate,
    ) -> Result<(), DbError>;

    async fn set_opportunity_status(
        &self,
        opportunity_id: i64,
        status: OpportunityStatus,
    ) -> Result<(), DbError>;

    async fn insert_solution_concepts(
        &self,
        opportunity_id: i64,
        concepts: &[NewSolutionConcept],
    ) -> Result<Vec<i64>, DbError>;

    async fn list_solution_concepts(
        &self,
        opportunity_id: i64,
    ) -> Result<Vec<SolutionConceptRow>, DbError>;

    async fn next_document_version(
        &self,
        opportunity_id: i64,
        document_type: DocumentType,
    ) -> Result<i32, DbError>;

    async fn insert_document(&self, document: &NewDocument) -> Result<i64, DbError>;

    async fn mark_planning_complete(
        &self,
        opportunity_id: i64,
        selected_concept: &serde_json::Value,
    ) -> Result<(), DbError>;
}

/// [`Store`] backed by the Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<LeadRow>, DbError> {
        picopitch_db::list_leads(&self.pool, filter).await
    }

    async fn record_lead_extraction(
        &self,
        lead_id: i64,
        update: &LeadExtractionUpdate,
    ) -> Result<(), DbError> {
        picopitch_db::record_lead_extraction(&self.pool, lead_id, update).await
    }

    async fn set_lead_status(&self, lead_ids: &[i64], status: LeadStatus) -> Result<u64, DbError> {
        picopitch_db::set_lead_status(&self.pool, lead_ids, status).await
    }

    async fn create_opportunity(&self, opportunity: &NewOpportunity) -> Result<i64, DbError> {
        picopitch_db::create_opportunity(&self.pool, opportunity).await
    }

    async fn list_opportunities(
        &self,
        filter: &OpportunityFilter,
    ) -> Result<Vec<OpportunityRow>, DbError> {
        picopitch_db::list_opportunities(&self.pool, filter).await
    }

    async fn record_validation(
        &self,
        opportunity_id: i64,
        update: &ValidationUpdate,
    ) -> Result<(), DbError> {
        picopitch_db::record_validation(&self.pool, opportunity_id, update).await
    }

    async fn set_opportunity_status(
        &self,
        opportunity_id: i64,
        status: OpportunityStatus,
    ) -> Result<(), DbError> {
        picopitch_db::set_opportunity_status(&self.pool, opportunity_id, status).await
    }

    async fn insert_solution_concepts(
        &self,
        opportunity_id: i64,
        concepts: &[NewSolutionConcept],
    ) -> Result<Vec<i64>, DbError> {
        picopitch_db::insert_solution_concepts(&self.pool, opportunity_id, concepts).await
    }

    async fn list_solution_concepts(
        &self,
        opportunity_id: i64,
    ) -> Result<Vec<SolutionConceptRow>, DbError> {
        picopitch_db::list_solution_concepts(&self.pool, opportunity_id).await
    }

    async fn next_document_version(
        &self,
        opportunity_id: i64,
        document_type: DocumentType,
    ) -> Result<i32, DbError> {
        picopitch_db::next_document_version(&self.pool, opportunity_id, document_type).await
    }

    async fn insert_document(&self, document: &NewDocument) -> Result<i64, DbError> {
        picopitch_db::insert_document(&self.pool, document).await
    }

    async fn mark_planning_complete(
        &self,
        opportunity_id: i64,
        selected_concept: &serde_json::Value,
    ) -> Result<(), DbError> {
        picopitch_db::mark_planning_complete(&self.pool, opportunity_id, selected_concept).await
    }
}
