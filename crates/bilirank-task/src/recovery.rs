//! Startup recovery for tasks interrupted by a restart.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::executor::TaskOutcome;
use crate::manager::drive_task;
use crate::progress::ProgressReporter;
use crate::runner::TaskRunner;
use crate::store::{StoreError, TaskStore};

/// Message stored on tasks whose heartbeat went stale.
pub const TIMEOUT_MESSAGE: &str = "task timed out: heartbeat is stale";

/// What recovery did, plus the re-executed tasks still running.
pub struct RecoveryReport {
    pub resumed: Vec<String>,
    pub timed_out: Vec<String>,
    pub tasks: JoinSet<(String, Result<TaskOutcome, TaskError>)>,
}

impl RecoveryReport {
    /// Waits for every resumed task and returns the ids that failed.
    pub async fn wait(mut self) -> Vec<String> {
        let mut failed = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((task_id, Err(_))) => failed.push(task_id),
                Err(e) => tracing::error!(error = %e, "recovered task panicked"),
            }
        }
        failed
    }
}

/// Looks at every active task once.
///
/// A task without a heartbeat gets one and is re-executed. A task whose
/// heartbeat is older than `stale_after` is failed without running. Anything
/// else is re-executed from its stored request, from the beginning, with its
/// progress clamped at the persisted position.
///
/// # Errors
///
/// Returns [`StoreError`] if the active tasks cannot be listed. Errors on
/// individual tasks are logged and skipped.
pub async fn recover_tasks(
    store: Arc<dyn TaskStore>,
    runner: Arc<dyn TaskRunner>,
    stale_after: chrono::Duration,
    cancel: &CancellationToken,
) -> Result<RecoveryReport, StoreError> {
    let active = store.list_active().await?;
    let now = Utc::now();
    let mut report = RecoveryReport {
        resumed: Vec::new(),
        timed_out: Vec::new(),
        tasks: JoinSet::new(),
    };
    tracing::info!(tasks = active.len(), "recovering active tasks");

    for record in active {
        let task_id = record.task_id.clone();
        if record.heartbeat_at.is_none() {
            if let Err(e) = store.touch_heartbeat(&task_id).await {
                tracing::warn!(task_id = %task_id, error = %e, "failed to touch heartbeat");
                continue;
            }
        } else if record.is_stale(now, stale_after) {
            match store.mark_failed(&task_id, TIMEOUT_MESSAGE).await {
                Ok(()) => {
                    tracing::warn!(task_id = %task_id, stage = %record.stage, "stale task marked failed");
                    report.timed_out.push(task_id);
                }
                Err(e) => tracing::warn!(task_id = %task_id, error = %e, "failed to fail stale task"),
            }
            continue;
        }

        tracing::info!(task_id = %task_id, stage = %record.stage, progress = record.progress, "resuming task");
        let progress = ProgressReporter::new(&task_id, Arc::clone(&store), None)
            .resume_from(record.stage, record.progress);
        let store = Arc::clone(&store);
        let runner = Arc::clone(&runner);
        let token = cancel.child_token();
        let request = record.request;
        report.resumed.push(task_id.clone());
        report.tasks.spawn(async move {
            let result =
                drive_task(runner.as_ref(), store.as_ref(), &request, &token, &progress).await;
            (task_id, result)
        });
    }

    tracing::info!(
        resumed = report.resumed.len(),
        timed_out = report.timed_out.len(),
        "recovery scheduled"
    );
    Ok(report)
}
