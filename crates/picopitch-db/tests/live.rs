//! Live integration tests for picopitch-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/picopitch-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use picopitch_core::{
    DocumentType, EvidenceDossier, ExtractionResult, LeadStatus, NewLead, OpportunityStatus,
    Recommendation,
};
use picopitch_db::{
    complete_collection_run, count_leads_by_status, create_collection_run, create_opportunity,
    fail_collection_run, get_collection_run, get_collection_run_by_public_id, get_lead,
    get_opportunity, insert_document, insert_solution_concepts, list_leads, list_opportunities,
    list_solution_concepts, mark_planning_complete, next_document_version, record_lead_extraction,
    record_validation, set_lead_status, start_collection_run, upsert_leads, DbError,
    LeadExtractionUpdate, LeadFilter, NewDocument, NewOpportunity, NewSolutionConcept,
    OpportunityFilter, ValidationUpdate, RUN_TYPE_PIPELINE, RUN_TYPE_SCRAPE,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_lead(external_id: &str, body: &str) -> NewLead {
    NewLead {
        external_id: external_id.to_string(),
        subreddit: Some("freelance".to_string()),
        author: Some("alice".to_string()),
        title: Some("Invoices".to_string()),
        body_text: body.to_string(),
        permalink: Some(format!("/r/freelance/comments/{external_id}")),
        url: None,
        is_comment: false,
        parent_external_id: None,
        score: 3,
        posted_at: None,
    }
}

async fn seed_leads(pool: &sqlx::PgPool, session: Option<Uuid>, ids: &[&str]) -> Vec<i64> {
    let leads: Vec<NewLead> = ids.iter().map(|id| make_lead(id, "body")).collect();
    upsert_leads(pool, session, &leads)
        .await
        .expect("upsert_leads failed");
    list_leads(pool, &LeadFilter::default())
        .await
        .expect("list_leads failed")
        .into_iter()
        .map(|row| row.id)
        .collect()
}

fn make_opportunity(lead_ids: Vec<i64>) -> NewOpportunity {
    NewOpportunity {
        theme_name: "Invoice Automation".to_string(),
        title: "InvoiceBot".to_string(),
        problem_summary_consolidated: "Freelancers lose hours to invoicing".to_string(),
        description: "Automated invoicing".to_string(),
        target_user: "Freelancers".to_string(),
        value_proposition: "Get paid faster".to_string(),
        domain_relevance: "General SaaS Opportunity".to_string(),
        based_on_lead_ids: lead_ids,
        evidence: Some(EvidenceDossier::seeded(3)),
    }
}

// ---------------------------------------------------------------------------
// Section 1: Collection Run Lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn collection_run_lifecycle_queued_to_succeeded(pool: sqlx::PgPool) {
    let run = create_collection_run(&pool, RUN_TYPE_PIPELINE, "cli")
        .await
        .expect("create_collection_run failed");
    assert_eq!(run.status, "queued");

    start_collection_run(&pool, run.id)
        .await
        .expect("start_collection_run failed");
    complete_collection_run(&pool, run.id, 5)
        .await
        .expect("complete_collection_run failed");

    let fetched = get_collection_run(&pool, run.id)
        .await
        .expect("get_collection_run failed");
    assert_eq!(fetched.status, "succeeded");
    assert!(fetched.started_at.is_some());
    assert!(fetched.completed_at.is_some());
    assert_eq!(fetched.records_processed, 5);
}

#[sqlx::test(migrations = "../../migrations")]
async fn collection_run_cannot_fail_directly_from_queued(pool: sqlx::PgPool) {
    let run = create_collection_run(&pool, RUN_TYPE_PIPELINE, "cli")
        .await
        .expect("create failed");

    let err = fail_collection_run(&pool, run.id, "boom")
        .await
        .expect_err("failing a queued run should be rejected");
    assert!(matches!(
        err,
        DbError::InvalidCollectionRunTransition {
            expected_status: "running",
            ..
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn scrape_run_is_found_by_session_id(pool: sqlx::PgPool) {
    let run = create_collection_run(&pool, RUN_TYPE_SCRAPE, "cli")
        .await
        .expect("create failed");
    let fetched = get_collection_run_by_public_id(&pool, run.public_id)
        .await
        .expect("lookup by public id failed");
    assert_eq!(fetched.id, run.id);
    assert_eq!(fetched.run_type, RUN_TYPE_SCRAPE);

    let missing = get_collection_run_by_public_id(&pool, Uuid::new_v4()).await;
    assert!(matches!(missing, Err(DbError::NotFound)));
}

// ---------------------------------------------------------------------------
// Section 2: Leads
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_is_idempotent_on_external_id(pool: sqlx::PgPool) {
    let session = Uuid::new_v4();
    upsert_leads(&pool, Some(session), &[make_lead("t3_a", "first")])
        .await
        .expect("first upsert failed");
    upsert_leads(&pool, Some(session), &[make_lead("t3_a", "second")])
        .await
        .expect("second upsert failed");

    let rows = list_leads(&pool, &LeadFilter::default())
        .await
        .expect("list failed");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].body_text, "second");
    assert_eq!(rows[0].status, LeadStatus::New);
    assert_eq!(rows[0].session_id, Some(session));
}

#[sqlx::test(migrations = "../../migrations")]
async fn rescrape_does_not_reset_pipeline_status(pool: sqlx::PgPool) {
    let ids = seed_leads(&pool, None, &["t3_a"]).await;
    set_lead_status(&pool, &ids, LeadStatus::ProblemExtractionFailed)
        .await
        .expect("set status failed");

    upsert_leads(&pool, None, &[make_lead("t3_a", "edited")])
        .await
        .expect("re-upsert failed");

    let row = get_lead(&pool, ids[0]).await.expect("get_lead failed");
    assert_eq!(row.status, LeadStatus::ProblemExtractionFailed);
}

#[sqlx::test(migrations = "../../migrations")]
async fn lead_filter_scopes_by_session_status_and_exclusions(pool: sqlx::PgPool) {
    let session = Uuid::new_v4();
    upsert_leads(
        &pool,
        Some(session),
        &[make_lead("t3_a", "a"), make_lead("t3_b", "b")],
    )
    .await
    .expect("session upsert failed");
    upsert_leads(&pool, None, &[make_lead("t3_c", "c")])
        .await
        .expect("unscoped upsert failed");

    let scoped = list_leads(
        &pool,
        &LeadFilter {
            status: Some(LeadStatus::New),
            session_id: Some(session),
            ..LeadFilter::default()
        },
    )
    .await
    .expect("scoped list failed");
    assert_eq!(scoped.len(), 2);

    let remaining = list_leads(
        &pool,
        &LeadFilter {
            status: Some(LeadStatus::New),
            exclude_ids: vec![scoped[0].id],
            limit: Some(50),
            ..LeadFilter::default()
        },
    )
    .await
    .expect("exclusion list failed");
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|row| row.id != scoped[0].id));
}

#[sqlx::test(migrations = "../../migrations")]
async fn extraction_update_stores_enhanced_blob(pool: sqlx::PgPool) {
    let ids = seed_leads(&pool, None, &["t3_a"]).await;
    let mut extraction = ExtractionResult::parse_fallback(Some("https://reddit.com/x".into()));
    extraction.problem_summary = "Invoices take hours".to_string();
    extraction.problem_domain = "Invoice Automation".to_string();

    record_lead_extraction(
        &pool,
        ids[0],
        &LeadExtractionUpdate::from_extraction(&extraction, true),
    )
    .await
    .expect("record extraction failed");

    let row = get_lead(&pool, ids[0]).await.expect("get_lead failed");
    assert_eq!(row.status, LeadStatus::ProblemExtracted);
    assert!(row.has_evidence);
    assert_eq!(row.problem_domain.as_deref(), Some("Invoice Automation"));
    assert_eq!(row.extraction(), Some(extraction));

    let counts = count_leads_by_status(&pool, None)
        .await
        .expect("count failed");
    assert_eq!(counts.get("problem_extracted"), Some(&1));
}

// ---------------------------------------------------------------------------
// Section 3: Opportunities, concepts, documents
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn creating_opportunity_marks_member_leads(pool: sqlx::PgPool) {
    let ids = seed_leads(&pool, None, &["t3_a", "t3_b", "t3_c"]).await;
    let opportunity_id = create_opportunity(&pool, &make_opportunity(ids.clone()))
        .await
        .expect("create_opportunity failed");

    let opportunity = get_opportunity(&pool, opportunity_id)
        .await
        .expect("get_opportunity failed");
    assert_eq!(opportunity.status, OpportunityStatus::OpportunityDefined);
    assert_eq!(opportunity.based_on_lead_ids, ids);
    assert_eq!(opportunity.total_posts_analyzed, 3);
    assert!(opportunity.evidence().is_some());

    for id in ids {
        let lead = get_lead(&pool, id).await.expect("get_lead failed");
        assert_eq!(lead.status, LeadStatus::OpportunityCreated);
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn validation_go_with_low_market_score_is_validated(pool: sqlx::PgPool) {
    let ids = seed_leads(&pool, None, &["t3_a"]).await;
    let opportunity_id = create_opportunity(&pool, &make_opportunity(ids))
        .await
        .expect("create failed");

    record_validation(
        &pool,
        opportunity_id,
        &ValidationUpdate {
            monetization_score: 9,
            market_size_score: 2,
            feasibility_score: 9,
            recommendation: Recommendation::Go,
            justification: "Strong pain".to_string(),
        },
    )
    .await
    .expect("record_validation failed");

    let validated = list_opportunities(
        &pool,
        &OpportunityFilter {
            status: Some(OpportunityStatus::OpportunityValidated),
            ..OpportunityFilter::default()
        },
    )
    .await
    .expect("list failed");
    assert_eq!(validated.len(), 1);
    assert_eq!(validated[0].market_size_score, Some(2));
    assert_eq!(validated[0].recommendation.as_deref(), Some("Go"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn concepts_documents_and_planning_completion(pool: sqlx::PgPool) {
    let ids = seed_leads(&pool, None, &["t3_a"]).await;
    let opportunity_id = create_opportunity(&pool, &make_opportunity(ids))
        .await
        .expect("create failed");

    insert_solution_concepts(
        &pool,
        opportunity_id,
        &[
            NewSolutionConcept {
                concept_name: "InvoiceBot".to_string(),
                core_features: vec!["Reminders".to_string(), "Templates".to_string()],
            },
            NewSolutionConcept {
                concept_name: "PayChaser".to_string(),
                core_features: vec!["Dunning".to_string()],
            },
        ],
    )
    .await
    .expect("insert concepts failed");

    let concepts = list_solution_concepts(&pool, opportunity_id)
        .await
        .expect("list concepts failed");
    assert_eq!(concepts.len(), 2);
    assert_eq!(concepts[0].concept_name, "InvoiceBot");
    assert_eq!(concepts[0].core_features.0.features.len(), 2);

    for expected_version in 1..=2 {
        let version = next_document_version(&pool, opportunity_id, DocumentType::Brd)
            .await
            .expect("next version failed");
        assert_eq!(version, expected_version);
        insert_document(
            &pool,
            &NewDocument {
                opportunity_id,
                document_type: DocumentType::Brd,
                version,
                content_markdown: "# BRD".to_string(),
                local_file_path: None,
            },
        )
        .await
        .expect("insert document failed");
    }
    assert_eq!(
        next_document_version(&pool, opportunity_id, DocumentType::Prd)
            .await
            .expect("next version failed"),
        1
    );

    mark_planning_complete(&pool, opportunity_id, &concepts[0].to_json())
        .await
        .expect("mark planning failed");
    let opportunity = get_opportunity(&pool, opportunity_id)
        .await
        .expect("get failed");
    assert_eq!(
        opportunity.status,
        OpportunityStatus::PlanningDocumentsGenerated
    );
    let selected = opportunity.selected_concept.expect("concept stored").0;
    assert_eq!(selected["concept_name"], "InvoiceBot");
}
