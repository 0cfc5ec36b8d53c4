use std::collections::HashMap;
use std::env::VarError;

use super::*;
use crate::analyze::{build_request, parse_dimension};

fn config(vars: &[(&str, &str)]) -> bilirank_core::AppConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    bilirank_core::build_app_config(|key| vars.get(key).cloned().ok_or(VarError::NotPresent))
        .expect("config should build")
}

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["bilirank", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli = Cli::try_parse_from(["bilirank", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["bilirank"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_bvid_decode() {
    let cli = Cli::try_parse_from(["bilirank", "bvid", "decode", "BV17x411w7KC"]).unwrap();
    match cli.command {
        Some(Commands::Bvid {
            command: BvidCommands::Decode { bvid },
        }) => assert_eq!(bvid, "BV17x411w7KC"),
        other => panic!("expected bvid decode, got: {other:?}"),
    }
}

#[test]
fn bvid_encode_rejects_non_numeric_aid() {
    let result = Cli::try_parse_from(["bilirank", "bvid", "encode", "abc"]);
    assert!(result.is_err());
}

#[test]
fn parses_tasks_purge_with_override() {
    let cli = Cli::try_parse_from(["bilirank", "tasks", "purge", "--days", "7"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Tasks {
            command: TaskCommands::Purge { days: Some(7) }
        })
    ));
}

#[test]
fn parses_tasks_purge_default() {
    let cli = Cli::try_parse_from(["bilirank", "tasks", "purge"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Tasks {
            command: TaskCommands::Purge { days: None }
        })
    ));
}

#[test]
fn parses_daemon() {
    let cli = Cli::try_parse_from(["bilirank", "daemon"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Daemon)));
}

#[test]
fn analyze_collects_repeated_flags() {
    let cli = Cli::try_parse_from([
        "bilirank",
        "analyze",
        "--category",
        "吸尘器",
        "--keyword",
        "吸尘器 推荐",
        "--keyword",
        "无线吸尘器",
        "--brand",
        "戴森",
        "--dimension",
        "吸力:清洁能力",
        "--dimension",
        "续航",
        "--max-comments",
        "300",
    ])
    .unwrap();

    let Some(Commands::Analyze(args)) = cli.command else {
        panic!("expected analyze command");
    };
    assert_eq!(args.keywords, vec!["吸尘器 推荐", "无线吸尘器"]);
    assert_eq!(args.brands, vec!["戴森"]);
    assert_eq!(args.dimensions[0].name, "吸力");
    assert_eq!(args.dimensions[0].description, "清洁能力");
    assert_eq!(args.dimensions[1].description, "");
    assert_eq!(args.max_comments, Some(300));
    assert!(!args.persist);
}

#[test]
fn analyze_requires_keyword_and_dimension() {
    let result = Cli::try_parse_from(["bilirank", "analyze", "--category", "耳机"]);
    assert!(result.is_err());
}

#[test]
fn dimension_accepts_full_width_colon() {
    let dim = parse_dimension("降噪：降噪效果").unwrap();
    assert_eq!(dim.name, "降噪");
    assert_eq!(dim.description, "降噪效果");
    assert!(parse_dimension(":描述").is_err());
}

#[test]
fn request_takes_limits_from_config_and_flags() {
    let config = config(&[("BILIRANK_MAX_COMMENTS", "800"), ("BILIRANK_MAX_CONCURRENCY", "3")]);
    let cli = Cli::try_parse_from([
        "bilirank",
        "analyze",
        "--category",
        "耳机",
        "--keyword",
        "降噪耳机",
        "--dimension",
        "降噪",
        "--months",
        "6",
    ])
    .unwrap();
    let Some(Commands::Analyze(args)) = cli.command else {
        panic!("expected analyze command");
    };

    let request = build_request(&config, &args);
    assert_eq!(request.limits.max_comments, 800);
    assert_eq!(request.limits.max_concurrency, 3);
    assert_eq!(request.limits.video_date_range_months, 6);
    assert_eq!(request.category, "耳机");
}

#[test]
fn stale_threshold_comes_from_config() {
    let config = config(&[("BILIRANK_TASK_STALE_SECS", "120")]);
    assert_eq!(
        tasks::stale_after(&config).unwrap(),
        chrono::Duration::seconds(120)
    );
}
