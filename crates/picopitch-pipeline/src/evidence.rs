//! Folding many extracted leads into one [`EvidenceDossier`].

use picopitch_core::{
    pain_point_percentage, source_url, EvidenceDossier, EvidenceQuote, ExtractionResult,
    Provenance, SourcePost, COMPETITOR_KEYWORDS,
};
use picopitch_db::LeadRow;

/// One lead's metadata paired with its normalized extraction.
#[derive(Debug, Clone)]
pub struct EvidenceRecord {
    pub provenance: Provenance,
    pub body_text: String,
    pub score: i32,
    pub is_comment: bool,
    pub extraction: ExtractionResult,
}

impl EvidenceRecord {
    /// `None` for leads that have not been extracted.
    #[must_use]
    pub fn from_lead(lead: &LeadRow) -> Option<Self> {
        let extraction = lead.extraction()?;
        Some(Self {
            provenance: Provenance {
                lead_id: lead.id,
                subreddit: lead.subreddit.clone(),
                author: lead.author.clone(),
                permalink: lead.permalink.clone(),
                source_url: source_url(lead.permalink.as_deref()),
            },
            body_text: lead.body_text.clone(),
            score: lead.score,
            is_comment: lead.is_comment,
            extraction,
        })
    }
}

/// Builds the dossier for `records`.
///
/// Records whose summary is the no-clear-problem sentinel count toward
/// `total_posts_analyzed` only. Histogram counts do not depend on record
/// order.
#[must_use]
pub fn aggregate(records: &[EvidenceRecord]) -> EvidenceDossier {
    let mut dossier = EvidenceDossier::seeded(records.len() as u64);

    for record in records {
        let extraction = &record.extraction;
        if extraction.is_no_clear_problem() {
            continue;
        }
        dossier.pain_point_frequency += 1;

        dossier.source_posts.push(SourcePost {
            provenance: record.provenance.clone(),
            problem_summary: extraction.problem_summary.clone(),
            urgency_level: extraction.urgency_level.to_string(),
            score: record.score,
            is_comment: record.is_comment,
        });

        dossier
            .supporting_quotes
            .extend(extraction.supporting_quotes.iter().map(|quote| EvidenceQuote {
                text: quote.text.clone(),
                context: quote.context.clone(),
                provenance: record.provenance.clone(),
            }));

        let financial = &extraction.financial_indicators;
        dossier
            .financial_indicators
            .amounts
            .extend(financial.amounts_mentioned.iter().cloned());
        *dossier
            .financial_indicators
            .willing_to_pay_counts
            .entry(financial.willing_to_pay.to_string())
            .or_insert(0) += 1;
        if let Some(cost) = financial
            .cost_of_problem
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        {
            dossier
                .financial_indicators
                .cost_of_problems
                .push(cost.to_string());
        }

        *dossier
            .urgency_distribution
            .entry(extraction.urgency_level.to_string())
            .or_insert(0) += 1;

        if let Some(permalink) = &record.provenance.permalink {
            dossier.source_links.push(permalink.clone());
        }

        let text = record.body_text.to_lowercase();
        for keyword in COMPETITOR_KEYWORDS {
            if text.contains(keyword) {
                *dossier
                    .competitor_mentions
                    .entry(keyword.to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    dossier.pain_point_percentage =
        pain_point_percentage(dossier.pain_point_frequency, dossier.total_posts_analyzed);
    dossier
}
