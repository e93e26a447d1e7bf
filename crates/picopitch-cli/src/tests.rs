use super::*;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["picopitch", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["picopitch", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["picopitch"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn scrape_defaults() {
    let cli = Cli::try_parse_from(["picopitch", "scrape", "SaaS", "r/smallbusiness"]).unwrap();
    match cli.command {
        Some(Commands::Scrape {
            subreddits,
            limit,
            comments,
            concurrency,
        }) => {
            assert_eq!(subreddits, vec!["SaaS", "r/smallbusiness"]);
            assert_eq!(limit, 50);
            assert_eq!(comments, 20);
            assert_eq!(concurrency, 2);
        }
        other => panic!("expected scrape, got {other:?}"),
    }
}

#[test]
fn scrape_with_limits() {
    let cli = Cli::try_parse_from([
        "picopitch",
        "scrape",
        "freelance",
        "--limit",
        "10",
        "--comments",
        "0",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Scrape {
            limit: 10,
            comments: 0,
            ..
        })
    ));
}

#[test]
fn scrape_requires_a_subreddit() {
    assert!(Cli::try_parse_from(["picopitch", "scrape"]).is_err());
}

#[test]
fn run_without_session_is_unscoped() {
    let cli = Cli::try_parse_from(["picopitch", "run"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Run { session: None })
    ));
}

#[test]
fn run_with_session() {
    let id = "6f1c1f4e-3a53-4d6a-9f55-0d3f8f0c2b11";
    let cli = Cli::try_parse_from(["picopitch", "run", "--session", id]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Run { session: Some(s) }) if s.to_string() == id
    ));
}

#[test]
fn run_rejects_malformed_session() {
    assert!(Cli::try_parse_from(["picopitch", "run", "--session", "not-a-uuid"]).is_err());
}

#[test]
fn parses_status_command() {
    let cli = Cli::try_parse_from(["picopitch", "status"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Status { session: None })
    ));
}

#[test]
fn session_of_a_scrape_run_scopes_the_pipeline() {
    let id = uuid::Uuid::new_v4();
    let scope = pipeline::session_scope(id, Some(picopitch_db::RUN_TYPE_SCRAPE)).unwrap();
    assert_eq!(scope, picopitch_pipeline::RunScope::Session(id));
}

#[test]
fn unknown_session_is_rejected() {
    let id = uuid::Uuid::new_v4();
    let err = pipeline::session_scope(id, None).unwrap_err();
    assert!(err.to_string().contains("no scrape session"));
}

#[test]
fn pipeline_run_id_is_not_a_session() {
    let id = uuid::Uuid::new_v4();
    let err = pipeline::session_scope(id, Some(picopitch_db::RUN_TYPE_PIPELINE)).unwrap_err();
    assert!(err.to_string().contains("pipeline run"));
}
