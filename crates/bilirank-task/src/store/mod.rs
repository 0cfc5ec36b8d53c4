//! Persistence seam for task records, reports and raw comments.

mod memory;
mod postgres;

use async_trait::async_trait;
use bilirank_core::{CoreError, RawComment, TaskRecord, TaskStage};
use bilirank_db::DbError;
use bilirank_report::ReportData;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(String),

    #[error("task {0} already exists")]
    Duplicate(String),

    #[error(transparent)]
    Transition(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Where task state lives.
///
/// Stage writes are monotonic: an implementation rejects a move out of a
/// terminal stage or back to an earlier stage, and never lowers `progress`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Records stage, percent and message, and refreshes the heartbeat.
    async fn update_progress(
        &self,
        task_id: &str,
        stage: TaskStage,
        progress: u8,
        message: &str,
    ) -> Result<(), StoreError>;

    async fn touch_heartbeat(&self, task_id: &str) -> Result<(), StoreError>;

    async fn mark_completed(
        &self,
        task_id: &str,
        report_id: Option<i64>,
        message: &str,
    ) -> Result<(), StoreError>;

    async fn mark_failed(&self, task_id: &str, error: &str) -> Result<(), StoreError>;

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// Tasks not yet `completed` or `failed`, oldest first.
    async fn list_active(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Fails active tasks whose heartbeat is older than `cutoff`; returns
    /// their ids. Tasks without a heartbeat are left alone.
    async fn fail_stale(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// Stores the finished report and returns its id.
    async fn save_report(&self, task_id: &str, report: &ReportData) -> Result<i64, StoreError>;

    /// Keeps a copy of scraped comments for the retention window. Returns the
    /// number of rows written.
    async fn save_raw_comments(
        &self,
        task_id: &str,
        comments: &[RawComment],
    ) -> Result<u64, StoreError>;

    async fn purge_raw_comments(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
