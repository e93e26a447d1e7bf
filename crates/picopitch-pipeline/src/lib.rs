//! Lead-to-plan pipeline: problem extraction, theme consolidation,
//! opportunity synthesis and validation, solution brainstorming, and
//! planning document generation.
//!
//! [`Pipeline`] drives the stages over a [`Store`]; model access goes
//! through two [`picopitch_llm::Invoker`]s, a fast one for per-lead
//! extraction and a deep one for everything else.

pub mod config;
pub mod documents;
pub mod error;
pub mod evidence;
pub mod export;
pub mod extractor;
pub mod opportunity;
pub mod orchestrator;
pub mod solutions;
pub mod store;
pub mod themes;

#[cfg(test)]
mod testing;

pub use config::PipelineConfig;
pub use error::{ConsolidationError, PipelineError};
pub use evidence::{aggregate, EvidenceRecord};
pub use export::DocumentExporter;
pub use extractor::{extract, Extraction, ExtractionMode};
pub use opportunity::Synthesis;
pub use orchestrator::{Pipeline, RunScope, RunSummary, StageReport};
pub use store::{PgStore, Store};
pub use themes::{consolidate, ConsolidationOptions, ThemeMap};

/// Result of processing one record in a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The record advanced to its next status.
    Succeeded,
    /// The record was moved to a failure status, or left for a later run.
    Failed,
    /// Nothing to do; the record keeps its status.
    Skipped,
}
