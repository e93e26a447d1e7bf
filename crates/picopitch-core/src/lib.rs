mod app_config;
mod config;
pub mod evidence;
pub mod extraction;
pub mod labels;
pub mod lead;
pub mod status;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, RedditCredentials};
pub use config::{load_app_config, load_app_config_from_env};
pub use evidence::{
    pain_point_percentage, EvidenceDossier, EvidenceQuote, FinancialEvidence, Provenance,
    SourcePost, COMPETITOR_KEYWORDS,
};
pub use extraction::{
    ExtractionResult, FinancialIndicators, SupportingQuote, NO_CLEAR_PROBLEM, PARSE_ERROR_SUMMARY,
};
pub use labels::{Level, SaasPotential, WillingToPay};
pub use lead::{source_url, NewLead, REDDIT_BASE_URL};
pub use status::{DocumentType, LeadStatus, OpportunityStatus, Recommendation};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid document type: {0}")]
    InvalidDocumentType(String),
}
