//! Normalized problem extraction for a single lead.

use serde::{Deserialize, Serialize};

use crate::labels::{Level, SaasPotential, WillingToPay};

/// Sentinel summary the model returns when a post contains no real problem.
pub const NO_CLEAR_PROBLEM: &str = "No clear problem";

/// Summary used by the evidence-path fallback when the model output is unusable.
pub const PARSE_ERROR_SUMMARY: &str = "Error parsing response";

const UNKNOWN_DOMAIN: &str = "Unknown";

/// A verbatim quote supporting the extracted problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportingQuote {
    pub text: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialIndicators {
    pub amounts_mentioned: Vec<String>,
    pub willing_to_pay: WillingToPay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_of_problem: Option<String>,
}

/// Every field is always populated; deserialization fills gaps with defaults
/// rather than failing, so a stored or model-produced blob never yields a
/// half-built value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawExtraction")]
pub struct ExtractionResult {
    pub problem_summary: String,
    pub problem_domain: String,
    pub urgency_level: Level,
    pub supporting_quotes: Vec<SupportingQuote>,
    pub financial_indicators: FinancialIndicators,
    pub saas_potential_flag: SaasPotential,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ExtractionResult {
    /// Fixed, fully-populated value substituted when evidence-path output cannot be parsed.
    #[must_use]
    pub fn parse_fallback(source_url: Option<String>) -> Self {
        Self {
            problem_summary: PARSE_ERROR_SUMMARY.to_string(),
            problem_domain: UNKNOWN_DOMAIN.to_string(),
            urgency_level: Level::Low,
            supporting_quotes: Vec::new(),
            financial_indicators: FinancialIndicators::default(),
            saas_potential_flag: SaasPotential::Uncertain,
            source_url,
        }
    }

    /// Rebuild an extraction from the flat columns written by the base path.
    #[must_use]
    pub fn from_legacy_fields(
        problem_summary: &str,
        problem_domain: Option<&str>,
        frustration_level: Option<&str>,
        saas_potential_flag: Option<&str>,
    ) -> Self {
        Self {
            problem_summary: problem_summary.to_string(),
            problem_domain: problem_domain.unwrap_or(UNKNOWN_DOMAIN).to_string(),
            urgency_level: frustration_level.map(Level::from).unwrap_or_default(),
            supporting_quotes: Vec::new(),
            financial_indicators: FinancialIndicators::default(),
            saas_potential_flag: saas_potential_flag
                .map(SaasPotential::from)
                .unwrap_or_default(),
            source_url: None,
        }
    }

    #[must_use]
    pub fn is_no_clear_problem(&self) -> bool {
        self.problem_summary.trim().eq_ignore_ascii_case(NO_CLEAR_PROBLEM)
    }
}

// ---------------------------------------------------------------------------
// Lenient wire shape
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawExtraction {
    problem_summary: Option<String>,
    problem_domain: Option<String>,
    urgency_level: Option<String>,
    frustration_level: Option<String>,
    supporting_quotes: Vec<RawQuote>,
    financial_indicators: Option<RawFinancial>,
    saas_potential_flag: Option<String>,
    source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQuote {
    Object {
        #[serde(default)]
        text: String,
        #[serde(default)]
        context: Option<String>,
    },
    Text(String),
    Ignored(serde_json::Value),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFinancial {
    amounts_mentioned: Vec<serde_json::Value>,
    willing_to_pay: Option<String>,
    cost_of_problem: Option<serde_json::Value>,
}

impl From<RawExtraction> for ExtractionResult {
    fn from(raw: RawExtraction) -> Self {
        let supporting_quotes = raw
            .supporting_quotes
            .into_iter()
            .filter_map(|quote| match quote {
                RawQuote::Object { text, context } => Some(SupportingQuote {
                    text,
                    context: context.unwrap_or_default(),
                }),
                RawQuote::Text(text) => Some(SupportingQuote {
                    text,
                    context: String::new(),
                }),
                RawQuote::Ignored(_) => None,
            })
            .collect();

        let financial = raw.financial_indicators.unwrap_or_default();
        let financial_indicators = FinancialIndicators {
            amounts_mentioned: financial
                .amounts_mentioned
                .into_iter()
                .filter_map(|value| match value {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            willing_to_pay: financial
                .willing_to_pay
                .map(WillingToPay::from)
                .unwrap_or_default(),
            cost_of_problem: match financial.cost_of_problem {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
        };

        Self {
            problem_summary: raw
                .problem_summary
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| NO_CLEAR_PROBLEM.to_string()),
            problem_domain: raw
                .problem_domain
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_DOMAIN.to_string()),
            urgency_level: raw
                .urgency_level
                .or(raw.frustration_level)
                .map(Level::from)
                .unwrap_or_default(),
            supporting_quotes,
            financial_indicators,
            saas_potential_flag: raw
                .saas_potential_flag
                .map(SaasPotential::from)
                .unwrap_or_default(),
            source_url: raw.source_url,
        }
    }
}
