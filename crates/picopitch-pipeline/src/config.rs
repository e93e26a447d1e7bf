use std::path::PathBuf;

use picopitch_core::AppConfig;

use crate::themes::ConsolidationOptions;

/// Knobs threaded through every pipeline stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded worker pool size for per-record fan-out.
    pub max_concurrent_tasks: usize,
    pub min_leads_for_theme: usize,
    pub theme_batch_size: usize,
    pub max_domains: usize,
    pub use_evidence: bool,
    pub output_dir: PathBuf,
    pub lead_page_size: i64,
    pub opportunity_page_size: i64,
    /// Document generation is the most expensive stage, so it pages slowly.
    pub planning_page_size: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 8,
            min_leads_for_theme: 3,
            theme_batch_size: 50,
            max_domains: 2000,
            use_evidence: true,
            output_dir: PathBuf::from("./picopitch_outputs"),
            lead_page_size: 50,
            opportunity_page_size: 50,
            planning_page_size: 5,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent_tasks: config.max_concurrent_tasks.max(1),
            min_leads_for_theme: config.min_leads_for_theme.max(1),
            theme_batch_size: config.theme_batch_size.max(1),
            max_domains: config.max_domains.max(1),
            use_evidence: config.use_evidence,
            output_dir: config.output_dir.clone(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn consolidation_options(&self) -> ConsolidationOptions {
        ConsolidationOptions {
            batch_size: self.theme_batch_size,
            max_domains: self.max_domains,
            ..ConsolidationOptions::default()
        }
    }
}
