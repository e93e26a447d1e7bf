//! `scrape` command: pulls new Reddit content into the lead table.
//!
//! Each invocation is one `scrape` collection run whose `public_id` becomes
//! the session id stamped on every lead it writes, so `run --session <id>`
//! can process exactly that batch. A subreddit that fails is logged and
//! skipped; the run only fails when every subreddit does.

use futures::stream::{self, StreamExt};
use picopitch_core::NewLead;
use picopitch_reddit::RedditClient;

use crate::fail_run_best_effort;

pub(crate) async fn run_scrape(
    pool: &sqlx::PgPool,
    config: &picopitch_core::AppConfig,
    subreddits: &[String],
    post_limit: u32,
    comments_per_post: u32,
    concurrency: usize,
) -> anyhow::Result<()> {
    let credentials = config.reddit.as_ref().ok_or_else(|| {
        anyhow::anyhow!(
            "REDDIT_CLIENT_ID, REDDIT_CLIENT_SECRET and REDDIT_USER_AGENT must be set to scrape"
        )
    })?;
    let client = RedditClient::connect(credentials)
        .await
        .map_err(|e| anyhow::anyhow!("failed to authenticate with Reddit: {e}"))?;

    let run = picopitch_db::create_collection_run(pool, picopitch_db::RUN_TYPE_SCRAPE, "cli")
        .await?;
    if let Err(e) = picopitch_db::start_collection_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, "scrape", format!("{e:#}")).await;
        return Err(e.into());
    }
    let session_id = run.public_id;

    let results: Vec<(&String, anyhow::Result<Vec<NewLead>>)> = stream::iter(subreddits)
        .map(|name| {
            let client = &client;
            async move {
                let leads = client
                    .scrape_subreddit(name, post_limit, comments_per_post)
                    .await
                    .map_err(anyhow::Error::from);
                (name, leads)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut leads: Vec<NewLead> = Vec::new();
    let mut failed_subreddits = 0usize;
    for (name, outcome) in results {
        match outcome {
            Ok(batch) => leads.extend(batch),
            Err(e) => {
                tracing::error!(subreddit = %name, error = %e, "failed to scrape subreddit");
                failed_subreddits += 1;
            }
        }
    }

    if failed_subreddits == subreddits.len() {
        let message = format!("all {failed_subreddits} subreddits failed to scrape");
        fail_run_best_effort(pool, run.id, "scrape", message.clone()).await;
        anyhow::bail!("{message}");
    }

    let written = match picopitch_db::upsert_leads(pool, Some(session_id), &leads).await {
        Ok(written) => written,
        Err(err) => {
            fail_run_best_effort(pool, run.id, "scrape", format!("{err:#}")).await;
            return Err(err.into());
        }
    };

    let records = i32::try_from(written).unwrap_or(i32::MAX);
    if let Err(err) = picopitch_db::complete_collection_run(pool, run.id, records).await {
        fail_run_best_effort(pool, run.id, "scrape", format!("{err:#}")).await;
        return Err(err.into());
    }

    tracing::info!(%session_id, written, failed_subreddits, "scrape complete");
    println!("scraped {written} leads from {} subreddits", subreddits.len() - failed_subreddits);
    println!("session: {session_id}");
    Ok(())
}
