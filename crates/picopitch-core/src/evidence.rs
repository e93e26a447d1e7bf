use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::labels::{Level, WillingToPay};

/// Where a quote or post came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub lead_id: i64,
    pub subreddit: Option<String>,
    pub author: Option<String>,
    pub permalink: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceQuote {
    pub text: String,
    pub context: String,
    #[serde(flatten)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePost {
    #[serde(flatten)]
    pub provenance: Provenance,
    pub problem_summary: String,
    pub urgency_level: String,
    pub score: i32,
    pub is_comment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialEvidence {
    pub amounts: Vec<String>,
    pub willing_to_pay_counts: BTreeMap<String, u64>,
    pub cost_of_problems: Vec<String>,
}

/// Aggregate evidence backing one opportunity. Stored as JSONB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDossier {
    pub total_posts_analyzed: u64,
    pub pain_point_frequency: u64,
    pub pain_point_percentage: f64,
    pub supporting_quotes: Vec<EvidenceQuote>,
    pub financial_indicators: FinancialEvidence,
    pub urgency_distribution: BTreeMap<String, u64>,
    pub competitor_mentions: BTreeMap<String, u64>,
    pub source_links: Vec<String>,
    pub source_posts: Vec<SourcePost>,
}

/// Vendor names scanned for in lead text.
pub const COMPETITOR_KEYWORDS: [&str; 6] =
    ["upwork", "toptal", "fiverr", "freelancer", "guru", "99designs"];

impl EvidenceDossier {
    /// A dossier over `total_posts_analyzed` leads with every known
    /// histogram bucket present at zero.
    #[must_use]
    pub fn seeded(total_posts_analyzed: u64) -> Self {
        let zeroed = |keys: &[&str]| -> BTreeMap<String, u64> {
            keys.iter().map(|k| ((*k).to_string(), 0)).collect()
        };
        Self {
            total_posts_analyzed,
            pain_point_frequency: 0,
            pain_point_percentage: 0.0,
            supporting_quotes: Vec::new(),
            financial_indicators: FinancialEvidence {
                amounts: Vec::new(),
                willing_to_pay_counts: zeroed(WillingToPay::KNOWN),
                cost_of_problems: Vec::new(),
            },
            urgency_distribution: zeroed(Level::KNOWN),
            competitor_mentions: zeroed(&COMPETITOR_KEYWORDS),
            source_links: Vec::new(),
            source_posts: Vec::new(),
        }
    }

    /// True when the dossier carries enough signal to drive the evidence
    /// variant of document drafting.
    #[must_use]
    pub fn has_signal(&self) -> bool {
        self.total_posts_analyzed > 0 && self.pain_point_frequency > 0
    }
}

/// `100 * frequency / total` to one decimal, exact halves to even, or 0 for
/// an empty population.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pain_point_percentage(frequency: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = frequency as f64 / total as f64 * 100.0;
    (raw * 10.0).round_ties_even() / 10.0
}
