//! Recurring housekeeping jobs.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::maintenance::{cleanup_timed_out_tasks, purge_raw_comments};
use crate::store::TaskStore;

/// Every ten minutes.
pub const STALE_SWEEP_CRON: &str = "0 */10 * * * *";

/// Daily at 03:00 UTC.
pub const RAW_COMMENT_PURGE_CRON: &str = "0 0 3 * * *";

/// Builds and starts the scheduler with the stale-task sweep and the raw
/// comment purge registered.
///
/// The returned handle must be kept alive; dropping it stops the jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be created, a job
/// cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    store: Arc<dyn TaskStore>,
    stale_after: chrono::Duration,
    retention_days: u32,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_stale_sweep_job(&scheduler, Arc::clone(&store), stale_after).await?;
    register_purge_job(&scheduler, store, retention_days).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_stale_sweep_job(
    scheduler: &JobScheduler,
    store: Arc<dyn TaskStore>,
    stale_after: chrono::Duration,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(STALE_SWEEP_CRON, move |_uuid, _lock| {
        let store = Arc::clone(&store);
        Box::pin(async move {
            tracing::debug!("scheduler: running stale task sweep");
            if let Err(e) = cleanup_timed_out_tasks(store.as_ref(), stale_after).await {
                tracing::error!(error = %e, "scheduler: stale task sweep failed");
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

async fn register_purge_job(
    scheduler: &JobScheduler,
    store: Arc<dyn TaskStore>,
    retention_days: u32,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(RAW_COMMENT_PURGE_CRON, move |_uuid, _lock| {
        let store = Arc::clone(&store);
        Box::pin(async move {
            tracing::info!("scheduler: starting raw comment purge");
            if let Err(e) = purge_raw_comments(store.as_ref(), retention_days).await {
                tracing::error!(error = %e, "scheduler: raw comment purge failed");
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}
