//! Database operations for `analysis_tasks`.
//!
//! Stage changes are guarded in the `WHERE` clause so a finished task can never
//! be reopened and a stage can never move backwards, even with two writers.

use bilirank_core::{TaskRecord, TaskRequest, TaskStage};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

const TASK_COLUMNS: &str = "task_id, request, stage, progress, message, heartbeat_at, \
                            report_id, error_message, created_at, updated_at";

/// A row from the `analysis_tasks` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub task_id: String,
    pub request: serde_json::Value,
    pub stage: String,
    pub progress: i16,
    pub message: String,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub report_id: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRow {
    /// Decodes the stored request JSON and stage into a [`TaskRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRow`] for an unknown stage or out-of-range
    /// progress, and [`DbError::Serialize`] if the request JSON no longer
    /// matches [`TaskRequest`].
    pub fn into_record(self) -> Result<TaskRecord, DbError> {
        let stage = self
            .stage
            .parse::<TaskStage>()
            .map_err(|e| DbError::InvalidRow(e.to_string()))?;
        let progress = u8::try_from(self.progress)
            .map_err(|_| DbError::InvalidRow(format!("progress {} out of range", self.progress)))?;
        let request: TaskRequest = serde_json::from_value(self.request)?;
        Ok(TaskRecord {
            task_id: self.task_id,
            request,
            stage,
            progress,
            message: self.message,
            heartbeat_at: self.heartbeat_at,
            report_id: self.report_id,
            error_message: self.error_message,
            created_at: self.created_at,
        })
    }
}

const ACTIVE_GUARD: &str = "stage NOT IN ('completed', 'failed')";

/// Inserts a new task record.
///
/// # Errors
///
/// Returns [`DbError::Serialize`] if the request cannot be encoded, or
/// [`DbError::Sqlx`] if the insert fails (including a duplicate `task_id`).
pub async fn insert_task(pool: &PgPool, record: &TaskRecord) -> Result<TaskRow, DbError> {
    let request = serde_json::to_value(&record.request)?;
    let sql = format!(
        "INSERT INTO analysis_tasks \
             (task_id, request, stage, progress, message, heartbeat_at, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {TASK_COLUMNS}"
    );
    let row = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(&record.task_id)
        .bind(request)
        .bind(record.stage.as_str())
        .bind(i16::from(record.progress))
        .bind(&record.message)
        .bind(record.heartbeat_at)
        .bind(record.created_at)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Records stage, progress and message, and refreshes the heartbeat.
///
/// Progress never decreases: the stored value is the max of old and new.
///
/// # Errors
///
/// Returns [`DbError::InvalidTaskTransition`] if the task does not exist, is
/// terminal, or is already past `stage`.
pub async fn update_task_progress(
    pool: &PgPool,
    task_id: &str,
    stage: TaskStage,
    progress: u8,
    message: &str,
) -> Result<(), DbError> {
    let allowed_from: Vec<String> = [
        TaskStage::Searching,
        TaskStage::Scraping,
        TaskStage::Analyzing,
        TaskStage::Generating,
    ]
    .into_iter()
    .filter(|from| from.can_transition_to(stage))
    .map(|from| from.as_str().to_string())
    .collect();

    let result = sqlx::query(
        "UPDATE analysis_tasks \
         SET stage = $2, progress = GREATEST(progress, $3), message = $4, \
             heartbeat_at = NOW(), updated_at = NOW() \
         WHERE task_id = $1 AND stage = ANY($5)",
    )
    .bind(task_id)
    .bind(stage.as_str())
    .bind(i16::from(progress.min(100)))
    .bind(message)
    .bind(allowed_from)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTaskTransition {
            task_id: task_id.to_string(),
            to: stage,
        });
    }
    Ok(())
}

/// Marks an active task `completed` at 100% with its report reference.
///
/// # Errors
///
/// Returns [`DbError::InvalidTaskTransition`] if the task is missing or
/// already terminal.
pub async fn complete_task(
    pool: &PgPool,
    task_id: &str,
    report_id: Option<i64>,
    message: &str,
) -> Result<(), DbError> {
    let sql = format!(
        "UPDATE analysis_tasks \
         SET stage = 'completed', progress = 100, message = $2, report_id = $3, \
             heartbeat_at = NOW(), updated_at = NOW() \
         WHERE task_id = $1 AND {ACTIVE_GUARD}"
    );
    let result = sqlx::query(&sql)
        .bind(task_id)
        .bind(message)
        .bind(report_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTaskTransition {
            task_id: task_id.to_string(),
            to: TaskStage::Completed,
        });
    }
    Ok(())
}

/// Marks an active task `failed` and stores the error message.
///
/// # Errors
///
/// Returns [`DbError::InvalidTaskTransition`] if the task is missing or
/// already terminal.
pub async fn fail_task(pool: &PgPool, task_id: &str, error_message: &str) -> Result<(), DbError> {
    let sql = format!(
        "UPDATE analysis_tasks \
         SET stage = 'failed', error_message = $2, updated_at = NOW() \
         WHERE task_id = $1 AND {ACTIVE_GUARD}"
    );
    let result = sqlx::query(&sql)
        .bind(task_id)
        .bind(error_message)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidTaskTransition {
            task_id: task_id.to_string(),
            to: TaskStage::Failed,
        });
    }
    Ok(())
}

/// Sets `heartbeat_at = NOW()` on an active task.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no active task has this id.
pub async fn touch_task_heartbeat(pool: &PgPool, task_id: &str) -> Result<(), DbError> {
    let sql = format!(
        "UPDATE analysis_tasks SET heartbeat_at = NOW(), updated_at = NOW() \
         WHERE task_id = $1 AND {ACTIVE_GUARD}"
    );
    let result = sqlx::query(&sql).bind(task_id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Fetches a task by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the task does not exist.
pub async fn get_task(pool: &PgPool, task_id: &str) -> Result<TaskRow, DbError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM analysis_tasks WHERE task_id = $1");
    sqlx::query_as::<_, TaskRow>(&sql)
        .bind(task_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// All tasks not yet `completed` or `failed`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_tasks(pool: &PgPool) -> Result<Vec<TaskRow>, DbError> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM analysis_tasks \
         WHERE {ACTIVE_GUARD} \
         ORDER BY created_at ASC, task_id ASC"
    );
    let rows = sqlx::query_as::<_, TaskRow>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

/// Fails every active task whose heartbeat is older than `cutoff`.
///
/// Tasks without a heartbeat are left alone. Returns the ids that were failed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_stale_tasks(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    error_message: &str,
) -> Result<Vec<String>, DbError> {
    let sql = format!(
        "UPDATE analysis_tasks \
         SET stage = 'failed', error_message = $2, updated_at = NOW() \
         WHERE {ACTIVE_GUARD} AND heartbeat_at < $1 \
         RETURNING task_id"
    );
    let ids = sqlx::query_scalar::<_, String>(&sql)
        .bind(cutoff)
        .bind(error_message)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}
