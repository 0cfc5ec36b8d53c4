//! Task maintenance commands and the long-running daemon.

use std::path::Path;
use std::sync::Arc;

use bilirank_core::AppConfig;
use bilirank_task::{
    build_scheduler, cleanup_timed_out_tasks, purge_raw_comments, recover_tasks, ConfiguredRunner,
    PgTaskStore, TaskRunner, TaskStore,
};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::analyze::{load_aliases, write_json};

pub(crate) fn stale_after(config: &AppConfig) -> anyhow::Result<chrono::Duration> {
    Ok(chrono::Duration::from_std(std::time::Duration::from_secs(
        config.task_stale_secs,
    ))?)
}

fn runner(config: &AppConfig, store: &Arc<dyn TaskStore>) -> anyhow::Result<Arc<dyn TaskRunner>> {
    Ok(Arc::new(ConfiguredRunner::new(
        config.clone(),
        Arc::clone(store),
        Arc::new(load_aliases(config)?),
    )))
}

pub(crate) async fn run_recover(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool));
    let report = recover_tasks(
        Arc::clone(&store),
        runner(config, &store)?,
        stale_after(config)?,
        &CancellationToken::new(),
    )
    .await?;
    println!(
        "resumed {} task(s), failed {} stale task(s)",
        report.resumed.len(),
        report.timed_out.len()
    );

    let failed = report.wait().await;
    if !failed.is_empty() {
        anyhow::bail!("{} recovered task(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

pub(crate) async fn run_sweep(pool: PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let store = PgTaskStore::new(pool);
    let failed = cleanup_timed_out_tasks(&store, stale_after(config)?).await?;
    println!("marked {} timed out task(s) as failed", failed.len());
    for id in failed {
        println!("  {id}");
    }
    Ok(())
}

pub(crate) async fn run_purge(
    pool: PgPool,
    config: &AppConfig,
    days: Option<u32>,
) -> anyhow::Result<()> {
    let store = PgTaskStore::new(pool);
    let days = days.unwrap_or(config.raw_comment_retention_days);
    let purged = purge_raw_comments(&store, days).await?;
    println!("purged {purged} raw comment(s) older than {days} day(s)");
    Ok(())
}

pub(crate) async fn run_show(pool: &PgPool, task_id: &str) -> anyhow::Result<()> {
    let row = bilirank_db::get_task(pool, task_id).await?;
    let record = row.into_record()?;
    println!("task:     {}", record.task_id);
    println!("category: {}", record.request.category);
    println!("stage:    {} ({}%)", record.stage, record.progress);
    if !record.message.is_empty() {
        println!("message:  {}", record.message);
    }
    if let Some(error) = &record.error_message {
        println!("error:    {error}");
    }
    if let Some(beat) = record.heartbeat_at {
        println!("heartbeat: {}", beat.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(report_id) = record.report_id {
        println!("report:   #{report_id}");
    }
    Ok(())
}

pub(crate) async fn run_report(
    pool: &PgPool,
    task_id: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let row = bilirank_db::get_report_for_task(pool, task_id).await?;
    write_json(&row.report, output)
}

pub(crate) async fn run_daemon(config: &AppConfig) -> anyhow::Result<()> {
    let pool = bilirank_db::connect_from_app_config(config).await?;
    let applied = bilirank_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations applied");

    let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool));
    let stale = stale_after(config)?;
    let mut recovery = recover_tasks(
        Arc::clone(&store),
        runner(config, &store)?,
        stale,
        &CancellationToken::new(),
    )
    .await?;

    let mut scheduler =
        build_scheduler(Arc::clone(&store), stale, config.raw_comment_retention_days).await?;
    tracing::info!(
        resumed = recovery.resumed.len(),
        timed_out = recovery.timed_out.len(),
        "daemon running"
    );

    shutdown_signal().await;

    scheduler.shutdown().await?;
    // Interrupted tasks keep their active row so the next start recovers them.
    recovery.tasks.shutdown().await;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, stopping");
}
