use picopitch_db::DbError;
use picopitch_llm::LlmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] DbError),

    #[error("model error: {0}")]
    Model(#[from] LlmError),

    #[error(transparent)]
    Consolidation(#[from] ConsolidationError),
}

#[derive(Debug, Error)]
pub enum ConsolidationError {
    #[error("all {batches} consolidation batches failed")]
    AllBatchesFailed { batches: usize },
}
