use std::sync::Arc;

use bilirank_core::{ProgressEvent, TaskRecord, TaskRequest, TaskStage};
use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::executor::TaskOutcome;
use crate::progress::ProgressReporter;
use crate::runner::TaskRunner;
use crate::store::{StoreError, TaskStore};

/// Runs one task and records a failure if it does not finish.
///
/// # Errors
///
/// Returns the runner's error after the task has been marked `failed`.
pub async fn drive_task(
    runner: &dyn TaskRunner,
    store: &dyn TaskStore,
    request: &TaskRequest,
    cancel: &CancellationToken,
    progress: &ProgressReporter,
) -> Result<TaskOutcome, TaskError> {
    match runner.run(request, cancel, progress).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            let message = err.to_string();
            tracing::error!(task_id = %request.task_id, error = %message, "task failed");
            if let Err(e) = store.mark_failed(&request.task_id, &message).await {
                tracing::warn!(task_id = %request.task_id, error = %e, "failed to record task failure");
            }
            progress.emit(TaskStage::Failed, 0, message);
            Err(err)
        }
    }
}

/// A submitted task.
pub struct TaskHandle {
    pub task_id: String,
    /// Progress events; never decreasing, ending with `completed` or
    /// `failed`.
    pub progress: UnboundedReceiver<ProgressEvent>,
    pub cancel: CancellationToken,
    pub join: JoinHandle<Result<TaskOutcome, TaskError>>,
}

/// Spawns tasks that outlive the caller's request.
///
/// Every task gets a child of the manager's shutdown token, so
/// [`TaskManager::shutdown`] cancels them all.
pub struct TaskManager {
    runner: Arc<dyn TaskRunner>,
    store: Arc<dyn TaskStore>,
    shutdown: CancellationToken,
}

impl TaskManager {
    #[must_use]
    pub fn new(runner: Arc<dyn TaskRunner>, store: Arc<dyn TaskStore>) -> Self {
        Self {
            runner,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Persists the task record and starts running it in the background.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record cannot be created; nothing is
    /// spawned in that case.
    pub async fn submit(&self, request: TaskRequest) -> Result<TaskHandle, StoreError> {
        let record = TaskRecord::new(request.clone(), Utc::now());
        self.store.create(&record).await?;
        tracing::info!(task_id = %record.task_id, category = %request.category, "task submitted");

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.shutdown.child_token();
        let progress = ProgressReporter::new(&record.task_id, Arc::clone(&self.store), Some(tx));

        let runner = Arc::clone(&self.runner);
        let store = Arc::clone(&self.store);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            drive_task(runner.as_ref(), store.as_ref(), &request, &token, &progress).await
        });

        Ok(TaskHandle {
            task_id: record.task_id,
            progress: rx,
            cancel,
            join,
        })
    }

    /// Cancels every task this manager started.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
