//! Prompt rendering.
//!
//! Each function embeds its inputs and names the JSON fields (or markdown
//! output) the matching parser expects. Wording is deliberately compact.

use std::fmt::Write as _;

/// Source metadata attached to an evidence-path extraction request.
#[derive(Debug, Clone, Copy)]
pub struct LeadContext<'a> {
    pub external_id: &'a str,
    pub permalink: Option<&'a str>,
    pub subreddit: Option<&'a str>,
    pub is_comment: bool,
}

/// The AI-authored fields of an opportunity that downstream prompts consume.
#[derive(Debug, Clone, Copy)]
pub struct OpportunityBrief<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub target_user: &'a str,
    pub value_proposition: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct ConceptBrief<'a> {
    pub name: &'a str,
    pub features: &'a [String],
}

fn bullet_list(items: &[String]) -> String {
    let mut out = String::new();
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
    out
}

#[must_use]
pub fn extraction_base(raw_text: &str) -> String {
    format!(
        "<analysis_task>\n\
         <input><raw_text>{raw_text}</raw_text></input>\n\
         <instructions>\n\
         Identify the core problem or pain point. If there is none, use \"No clear problem\".\n\
         Summarize it in 1-2 sentences, classify its domain or niche, judge whether a SaaS \
         product could solve it (Yes | No | Uncertain) and rate the author's frustration \
         (Low | Medium | High).\n\
         </instructions>\n\
         <output format=\"json\">\n\
         {{\"problem_summary\": string, \"problem_domain\": string, \
         \"saas_potential_flag\": string, \"frustration_level\": string}}\n\
         </output>\n\
         </analysis_task>"
    )
}

#[must_use]
pub fn extraction_evidence(raw_text: &str, context: LeadContext<'_>) -> String {
    format!(
        "<extraction_task>\n\
         <input>\n\
         <raw_text>{raw_text}</raw_text>\n\
         <source_metadata><reddit_id>{id}</reddit_id><permalink>{permalink}</permalink>\
         <subreddit>{subreddit}</subreddit><is_comment>{is_comment}</is_comment></source_metadata>\n\
         </input>\n\
         <instructions>\n\
         Identify the core problem (or \"No clear problem\"). Quote 1-3 exact passages that \
         show the pain, preserving the author's wording. Rate urgency (Low | Medium | High). \
         Extract dollar amounts, cost of the problem and willingness to pay \
         (Yes | No | Maybe | Unknown). Classify the domain and SaaS potential (Yes | No | Uncertain).\n\
         </instructions>\n\
         <output format=\"json\">\n\
         {{\"problem_summary\": string, \"problem_domain\": string, \
         \"supporting_quotes\": [{{\"text\": string, \"context\": string}}], \
         \"urgency_level\": string, \"financial_indicators\": {{\"amounts_mentioned\": [string], \
         \"willing_to_pay\": string, \"cost_of_problem\": string}}, \
         \"saas_potential_flag\": string}}\n\
         </output>\n\
         </extraction_task>",
        id = context.external_id,
        permalink = context.permalink.unwrap_or(""),
        subreddit = context.subreddit.unwrap_or("unknown"),
        is_comment = context.is_comment,
    )
}

#[must_use]
pub fn thematic_summary(theme: &str, problem_summaries: &[String]) -> String {
    format!(
        "<thematic_analysis_task>\n\
         <input><problem_domain>{theme}</problem_domain>\n\
         <problem_summaries>\n{summaries}</problem_summaries></input>\n\
         <instructions>Synthesize these problems from one domain into a single overarching \
         pain point, write a consolidated summary and a catchy title of at most 7 words.\
         </instructions>\n\
         <output format=\"json\">\n\
         {{\"common_theme_description\": string, \"consolidated_problem_summary\": string, \
         \"theme_title\": string}}\n\
         </output>\n\
         </thematic_analysis_task>",
        summaries = bullet_list(problem_summaries),
    )
}

#[must_use]
pub fn theme_consolidation(domain_labels: &[String]) -> String {
    format!(
        "<theme_consolidation_task>\n\
         <input><domain_list>\n{labels}</domain_list></input>\n\
         <instructions>Group domains that refer to the same core concept and give each group \
         a concise canonical theme name. A domain that fits nowhere is its own group. Every \
         input domain must appear in exactly one group, spelled exactly as given.</instructions>\n\
         <output format=\"json\">Object whose keys are canonical theme names and whose values \
         are arrays of original domain names.</output>\n\
         </theme_consolidation_task>",
        labels = bullet_list(domain_labels),
    )
}

#[must_use]
pub fn opportunity_identification(problem_summary: &str, problem_domain: &str) -> String {
    format!(
        "<opportunity_analysis>\n\
         <input><problem_summary>{problem_summary}</problem_summary>\
         <problem_domain>{problem_domain}</problem_domain></input>\n\
         <instructions>Describe a practical micro-SaaS opportunity addressing this problem, \
         its primary target user, its core value proposition, the domain it relates to (or \
         \"General SaaS Opportunity\") and a title of at most 5 words.</instructions>\n\
         <output format=\"json\">\n\
         {{\"opportunity_description\": string, \"target_user\": string, \
         \"value_proposition\": string, \"domain_relevance\": string, \
         \"opportunity_title\": string}}\n\
         </output>\n\
         </opportunity_analysis>"
    )
}

#[must_use]
pub fn opportunity_validation(brief: OpportunityBrief<'_>, consolidated_problem: &str) -> String {
    format!(
        "<opportunity_validation_task>\n\
         <context>You are a cynical but fair venture capitalist.</context>\n\
         <input><opportunity_title>{title}</opportunity_title>\
         <target_user>{target_user}</target_user>\
         <value_proposition>{value_proposition}</value_proposition>\
         <consolidated_problem>{consolidated_problem}</consolidated_problem></input>\n\
         <instructions>Score monetization potential, market size and MVP feasibility from 1 \
         to 10. Recommend Go when scores are generally above 6 with at least one 8+, No-Go when \
         any score is below 4 or the average is below 5. Justify in 2-3 sentences.</instructions>\n\
         <output format=\"json\">\n\
         {{\"monetization_score\": integer, \"market_size_score\": integer, \
         \"feasibility_score\": integer, \"recommendation\": \"Go\" | \"No-Go\", \
         \"justification\": string}}\n\
         </output>\n\
         </opportunity_validation_task>",
        title = brief.title,
        target_user = brief.target_user,
        value_proposition = brief.value_proposition,
    )
}

#[must_use]
pub fn solution_concepts(brief: OpportunityBrief<'_>) -> String {
    format!(
        "<solution_brainstorming>\n\
         <input><opportunity_description>{description}</opportunity_description>\
         <target_user>{target_user}</target_user>\
         <value_proposition>{value_proposition}</value_proposition></input>\n\
         <instructions>Brainstorm 1-3 distinct SaaS solution concepts. Name each one and list \
         3-5 specific core features.</instructions>\n\
         <output format=\"json_array\">\n\
         [{{\"concept_name\": string, \"core_features\": [string]}}]\n\
         </output>\n\
         </solution_brainstorming>",
        description = brief.description,
        target_user = brief.target_user,
        value_proposition = brief.value_proposition,
    )
}

/// Business requirements document. `evidence_json` selects the
/// evidence-backed variant, which cites quotes and statistics.
#[must_use]
pub fn brd(
    current_date: &str,
    pain_point_summary: &str,
    brief: OpportunityBrief<'_>,
    concept: ConceptBrief<'_>,
    evidence_json: Option<&str>,
) -> String {
    let evidence = evidence_json.map_or_else(String::new, |json| {
        format!(
            "<evidence>{json}</evidence>\n\
             <evidence_rules>Cite real user quotes with their source links, state how many \
             posts were analyzed and how often the pain point appeared, and summarize the \
             financial, urgency and competitor signals.</evidence_rules>\n"
        )
    });
    format!(
        "<brd_task>\n\
         <date>{current_date}</date>\n\
         <pain_point>{pain_point_summary}</pain_point>\n\
         <opportunity><title>{title}</title><description>{description}</description>\
         <target_user>{target_user}</target_user>\
         <value_proposition>{value_proposition}</value_proposition></opportunity>\n\
         <concept><name>{concept_name}</name><features>\n{features}</features></concept>\n\
         {evidence}\
         <instructions>Write a Business Requirements Document in Markdown covering executive \
         summary, problem statement, business objectives, scope, stakeholders, success metrics \
         and risks.</instructions>\n\
         </brd_task>",
        title = brief.title,
        description = brief.description,
        target_user = brief.target_user,
        value_proposition = brief.value_proposition,
        concept_name = concept.name,
        features = bullet_list(concept.features),
    )
}

/// Product requirements document derived from a BRD.
#[must_use]
pub fn prd(
    brd_markdown: &str,
    brief: OpportunityBrief<'_>,
    concept: ConceptBrief<'_>,
    evidence_json: Option<&str>,
) -> String {
    let evidence = evidence_json
        .map(|json| format!("<evidence>{json}</evidence>\n"))
        .unwrap_or_default();
    format!(
        "<prd_task>\n\
         <brd>\n{brd_markdown}\n</brd>\n\
         <opportunity><title>{title}</title><target_user>{target_user}</target_user></opportunity>\n\
         <concept><name>{concept_name}</name><features>\n{features}</features></concept>\n\
         {evidence}\
         <instructions>Write a Product Requirements Document in Markdown with user personas, \
         user stories with acceptance criteria, functional and non-functional requirements \
         and release criteria.</instructions>\n\
         </prd_task>",
        title = brief.title,
        target_user = brief.target_user,
        concept_name = concept.name,
        features = bullet_list(concept.features),
    )
}

/// Agile delivery plan derived from a PRD.
#[must_use]
pub fn agile_plan(prd_markdown: &str) -> String {
    format!(
        "<agile_breakdown_task>\n\
         <prd>\n{prd_markdown}\n</prd>\n\
         <instructions>Break the PRD into epics, user stories and tasks with story-point \
         estimates, then group them into two-week sprints. Output Markdown.</instructions>\n\
         </agile_breakdown_task>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consolidation_prompt_lists_every_label() {
        let labels = vec!["Invoice Automation".to_string(), "Billing Tools".to_string()];
        let prompt = theme_consolidation(&labels);
        assert!(prompt.contains("- Invoice Automation\n"));
        assert!(prompt.contains("- Billing Tools\n"));
    }

    #[test]
    fn evidence_extraction_embeds_metadata() {
        let prompt = extraction_evidence(
            "I hate invoicing",
            LeadContext {
                external_id: "t3_abc",
                permalink: Some("/r/freelance/comments/abc"),
                subreddit: None,
                is_comment: false,
            },
        );
        assert!(prompt.contains("<reddit_id>t3_abc</reddit_id>"));
        assert!(prompt.contains("<subreddit>unknown</subreddit>"));
        assert!(prompt.contains("\"urgency_level\""));
    }

    #[test]
    fn brd_evidence_block_is_optional() {
        let features = vec!["Auto reminders".to_string()];
        let brief = OpportunityBrief {
            title: "InvoiceBot",
            description: "d",
            target_user: "freelancers",
            value_proposition: "v",
        };
        let concept = ConceptBrief {
            name: "Bot",
            features: &features,
        };
        let plain = brd("January 01, 2026", "pain", brief, concept, None);
        let rich = brd("January 01, 2026", "pain", brief, concept, Some("{\"x\":1}"));
        assert!(!plain.contains("<evidence>"));
        assert!(rich.contains("<evidence>{\"x\":1}</evidence>"));
        assert!(plain.contains("- Auto reminders"));
    }
}
