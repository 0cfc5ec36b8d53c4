//! The `analyze` command: one task, run in-process, report written as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bilirank_analysis::BrandAliases;
use bilirank_core::{AppConfig, Dimension, TaskRequest};
use bilirank_task::{
    ConfiguredRunner, MemoryTaskStore, PgTaskStore, TaskManager, TaskOutcome, TaskRunner,
    TaskStore,
};
use clap::Args;

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Product category, e.g. 吸尘器
    #[arg(long)]
    pub category: String,
    /// Search keyword; repeat for several
    #[arg(long = "keyword", required = true)]
    pub keywords: Vec<String>,
    /// Brand to rank; repeat for several
    #[arg(long = "brand")]
    pub brands: Vec<String>,
    /// Evaluation dimension as `name` or `name:description`; repeat for several
    #[arg(long = "dimension", required = true, value_parser = parse_dimension)]
    pub dimensions: Vec<Dimension>,
    /// Global comment budget
    #[arg(long)]
    pub max_comments: Option<usize>,
    /// Search results kept per keyword
    #[arg(long)]
    pub max_videos_per_keyword: Option<usize>,
    /// Drop videos older than this many months
    #[arg(long)]
    pub months: Option<u32>,
    /// Store the task in Postgres instead of memory
    #[arg(long)]
    pub persist: bool,
    /// Write the report here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub(crate) fn parse_dimension(raw: &str) -> Result<Dimension, String> {
    let (name, description) = match raw.split_once([':', '：']) {
        Some((name, description)) => (name.trim(), description.trim()),
        None => (raw.trim(), ""),
    };
    if name.is_empty() {
        return Err(format!("dimension '{raw}' has an empty name"));
    }
    Ok(Dimension::new(name, description))
}

pub(crate) fn build_request(config: &AppConfig, args: &AnalyzeArgs) -> TaskRequest {
    let mut request = TaskRequest::new(
        args.category.trim(),
        args.keywords.clone(),
        args.brands.clone(),
        args.dimensions.clone(),
    );
    request.limits = config.task_limits.clone();
    if let Some(max) = args.max_comments {
        request.limits.max_comments = max;
    }
    if let Some(max) = args.max_videos_per_keyword {
        request.limits.max_videos_per_keyword = max;
    }
    if let Some(months) = args.months {
        request.limits.video_date_range_months = months;
    }
    request
}

pub(crate) fn load_aliases(config: &AppConfig) -> anyhow::Result<BrandAliases> {
    match &config.brand_aliases_path {
        Some(path) => Ok(BrandAliases::from_yaml_file(path)?),
        None => Ok(BrandAliases::default()),
    }
}

pub(crate) fn write_json(value: &serde_json::Value, output: Option<&Path>) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

pub(crate) async fn run_analyze(config: &AppConfig, args: &AnalyzeArgs) -> anyhow::Result<()> {
    let store: Arc<dyn TaskStore> = if args.persist {
        let pool = bilirank_db::connect_from_app_config(config).await?;
        bilirank_db::run_migrations(&pool).await?;
        Arc::new(PgTaskStore::new(pool))
    } else {
        Arc::new(MemoryTaskStore::new())
    };
    let aliases = Arc::new(load_aliases(config)?);
    let runner: Arc<dyn TaskRunner> = Arc::new(ConfiguredRunner::new(
        config.clone(),
        Arc::clone(&store),
        aliases,
    ));
    let manager = TaskManager::new(runner, store);

    let request = build_request(config, args);
    let mut handle = manager.submit(request).await?;
    eprintln!("task {} started", handle.task_id);

    loop {
        tokio::select! {
            event = handle.progress.recv() => {
                let Some(event) = event else { break };
                eprintln!("[{:>3}%] {:<10} {}", event.current, event.stage, event.message);
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("cancelling task {}...", handle.task_id);
                handle.cancel.cancel();
            }
        }
    }

    let TaskOutcome {
        task_id,
        report_id,
        report,
    } = handle.join.await??;
    tracing::info!(task_id = %task_id, report_id, "analysis finished");
    write_json(&serde_json::to_value(&report)?, args.output.as_deref())
}
