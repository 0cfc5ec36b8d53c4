//! Persisted report documents.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `reports` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReportRow {
    pub id: i64,
    pub task_id: String,
    pub category: String,
    pub report: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Serializes `report` to JSONB and stores it. Returns the new report id.
///
/// # Errors
///
/// Returns [`DbError::Serialize`] if the report cannot be encoded, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn insert_report<T: Serialize>(
    pool: &PgPool,
    task_id: &str,
    category: &str,
    report: &T,
) -> Result<i64, DbError> {
    let document = serde_json::to_value(report)?;
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO reports (task_id, category, report) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(task_id)
    .bind(category)
    .bind(document)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Fetches a report by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no report has this id.
pub async fn get_report(pool: &PgPool, id: i64) -> Result<ReportRow, DbError> {
    sqlx::query_as::<_, ReportRow>(
        "SELECT id, task_id, category, report, created_at FROM reports WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// The most recent report written for a task.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the task has no report.
pub async fn get_report_for_task(pool: &PgPool, task_id: &str) -> Result<ReportRow, DbError> {
    sqlx::query_as::<_, ReportRow>(
        "SELECT id, task_id, category, report, created_at FROM reports \
         WHERE task_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
