mod pipeline;
mod scrape;
mod status;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "picopitch")]
#[command(about = "Mine Reddit pain points into validated SaaS opportunities")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database utilities
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Fetch new posts and comments into the lead table as one session
    Scrape {
        /// Subreddits to scrape, with or without the `r/` prefix
        #[arg(required = true)]
        subreddits: Vec<String>,
        /// Newest posts to fetch per subreddit
        #[arg(long, default_value = "50")]
        limit: u32,
        /// Top-level comments to fetch per post
        #[arg(long, default_value = "20")]
        comments: u32,
        /// Subreddits scraped at once
        #[arg(long, default_value = "2")]
        concurrency: usize,
    },
    /// Run every pipeline stage over pending leads and opportunities
    Run {
        /// Restrict lead stages to one scrape session
        #[arg(long)]
        session: Option<Uuid>,
    },
    /// Show lead and opportunity counts by status
    Status {
        /// Restrict lead counts to one scrape session
        #[arg(long)]
        session: Option<Uuid>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Verify the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("picopitch: no command given; see --help");
        return Ok(());
    };

    let config = picopitch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool = picopitch_db::connect_pool(
        &config.database_url,
        picopitch_db::PoolConfig::from_app_config(&config),
    )
    .await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                picopitch_db::ping(&pool).await?;
                println!("database ok");
            }
            DbCommands::Migrate => {
                let applied = picopitch_db::run_migrations(&pool).await?;
                println!("applied {applied} migrations");
            }
        },
        Commands::Scrape {
            subreddits,
            limit,
            comments,
            concurrency,
        } => {
            scrape::run_scrape(&pool, &config, &subreddits, limit, comments, concurrency).await?;
        }
        Commands::Run { session } => pipeline::run_pipeline(&pool, &config, session).await?,
        Commands::Status { session } => status::print_status(&pool, session).await?,
    }

    Ok(())
}

/// Attempt to mark a collection run as failed, logging any secondary error.
pub(crate) async fn fail_run_best_effort(
    pool: &sqlx::PgPool,
    run_id: i64,
    context: &'static str,
    message: String,
) {
    if let Err(mark_err) = picopitch_db::fail_collection_run(pool, run_id, &message).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark {context} run as failed"
        );
    }
}

#[cfg(test)]
mod tests;
