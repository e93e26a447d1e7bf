use std::collections::BTreeMap;

use picopitch_core::{LeadStatus, OpportunityStatus};
use uuid::Uuid;

const RECENT_RUNS: i64 = 5;

/// Prints lead and opportunity counts for every known status, zeros included.
pub(crate) async fn print_status(pool: &sqlx::PgPool, session: Option<Uuid>) -> anyhow::Result<()> {
    let leads = picopitch_db::count_leads_by_status(pool, session).await?;
    let opportunities = picopitch_db::count_opportunities_by_status(pool).await?;

    match session {
        Some(id) => println!("LEADS (session {id})"),
        None => println!("LEADS"),
    }
    print_counts(LeadStatus::ALL.iter().map(|s| s.as_str()), &leads);

    println!();
    println!("OPPORTUNITIES");
    print_counts(
        OpportunityStatus::ALL.iter().map(|s| s.as_str()),
        &opportunities,
    );

    let runs = picopitch_db::list_collection_runs(pool, RECENT_RUNS).await?;
    if !runs.is_empty() {
        println!();
        println!("RECENT RUNS");
        for run in &runs {
            let when = run
                .started_at
                .unwrap_or(run.created_at)
                .format("%Y-%m-%d %H:%M");
            println!(
                "  {when}  {:<9}{:<10}{:>6}  {}",
                run.run_type, run.status, run.records_processed, run.public_id
            );
            if let Some(message) = &run.error_message {
                println!("    error: {message}");
            }
        }
    }
    Ok(())
}

fn print_counts<'a>(statuses: impl Iterator<Item = &'a str>, counts: &BTreeMap<String, i64>) {
    let mut total = 0i64;
    for status in statuses {
        let count = counts.get(status).copied().unwrap_or(0);
        total += count;
        println!("  {status:<32}{count:>8}");
    }
    println!("  {:<32}{total:>8}", "total");
}
