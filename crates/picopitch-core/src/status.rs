//! Persisted state-machine statuses for leads and opportunities.
//!
//! Every stage of the pipeline selects its work by one of these statuses and
//! moves each record to exactly one successor. The string forms are what the
//! database stores; the `CHECK` constraints in the migrations mirror them.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Lifecycle of a scraped lead.
///
/// `new → problem_extracted → opportunity_created`, with the two failure
/// branches being terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    ProblemExtracted,
    OpportunityCreated,
    ProblemExtractionFailed,
    ThematicAnalysisFailed,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::ProblemExtracted,
        LeadStatus::OpportunityCreated,
        LeadStatus::ProblemExtractionFailed,
        LeadStatus::ThematicAnalysisFailed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::ProblemExtracted => "problem_extracted",
            LeadStatus::OpportunityCreated => "opportunity_created",
            LeadStatus::ProblemExtractionFailed => "problem_extraction_failed",
            LeadStatus::ThematicAnalysisFailed => "thematic_analysis_failed",
        }
    }

    /// Terminal statuses are never selected by any stage again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LeadStatus::OpportunityCreated
                | LeadStatus::ProblemExtractionFailed
                | LeadStatus::ThematicAnalysisFailed
        )
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::InvalidStatus(s.to_string()))
    }
}

impl TryFrom<String> for LeadStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Lifecycle of a synthesized opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    OpportunityDefined,
    OpportunityValidated,
    SolutionsBrainstormed,
    PlanningDocumentsGenerated,
    OpportunityRejected,
    ValidationFailed,
    SolutionBrainstormFailed,
}

impl OpportunityStatus {
    pub const ALL: [OpportunityStatus; 7] = [
        OpportunityStatus::OpportunityDefined,
        OpportunityStatus::OpportunityValidated,
        OpportunityStatus::SolutionsBrainstormed,
        OpportunityStatus::PlanningDocumentsGenerated,
        OpportunityStatus::OpportunityRejected,
        OpportunityStatus::ValidationFailed,
        OpportunityStatus::SolutionBrainstormFailed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OpportunityStatus::OpportunityDefined => "opportunity_defined",
            OpportunityStatus::OpportunityValidated => "opportunity_validated",
            OpportunityStatus::SolutionsBrainstormed => "solutions_brainstormed",
            OpportunityStatus::PlanningDocumentsGenerated => "planning_documents_generated",
            OpportunityStatus::OpportunityRejected => "opportunity_rejected",
            OpportunityStatus::ValidationFailed => "validation_failed",
            OpportunityStatus::SolutionBrainstormFailed => "solution_brainstorm_failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OpportunityStatus::PlanningDocumentsGenerated
                | OpportunityStatus::OpportunityRejected
                | OpportunityStatus::ValidationFailed
                | OpportunityStatus::SolutionBrainstormFailed
        )
    }
}

impl std::fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OpportunityStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpportunityStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::InvalidStatus(s.to_string()))
    }
}

impl TryFrom<String> for OpportunityStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Kinds of planning document produced for an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "BRD")]
    Brd,
    #[serde(rename = "PRD")]
    Prd,
    #[serde(rename = "AGILE_PLAN")]
    AgilePlan,
}

impl DocumentType {
    /// Generation order: each document is drafted from its predecessor.
    pub const ALL: [DocumentType; 3] = [DocumentType::Brd, DocumentType::Prd, DocumentType::AgilePlan];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Brd => "BRD",
            DocumentType::Prd => "PRD",
            DocumentType::AgilePlan => "AGILE_PLAN",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|doc_type| doc_type.as_str() == s)
            .ok_or_else(|| CoreError::InvalidDocumentType(s.to_string()))
    }
}

impl TryFrom<String> for DocumentType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Categorical outcome of opportunity validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Go,
    #[serde(rename = "No-Go")]
    NoGo,
}

impl Recommendation {
    /// Anything other than a (case-insensitive) `Go` is a No-Go.
    #[must_use]
    pub fn from_model_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some(l) if l.eq_ignore_ascii_case("go") => Recommendation::Go,
            _ => Recommendation::NoGo,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::Go => "Go",
            Recommendation::NoGo => "No-Go",
        }
    }
}
