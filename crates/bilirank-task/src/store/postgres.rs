use async_trait::async_trait;
use bilirank_core::{RawComment, TaskRecord, TaskStage};
use bilirank_db::DbError;
use bilirank_report::ReportData;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{StoreError, TaskStore};

/// [`TaskStore`] over the `bilirank-db` tables.
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, record: &TaskRecord) -> Result<(), StoreError> {
        bilirank_db::insert_task(&self.pool, record).await?;
        Ok(())
    }

    async fn update_progress(
        &self,
        task_id: &str,
        stage: TaskStage,
        progress: u8,
        message: &str,
    ) -> Result<(), StoreError> {
        bilirank_db::update_task_progress(&self.pool, task_id, stage, progress, message).await?;
        Ok(())
    }

    async fn touch_heartbeat(&self, task_id: &str) -> Result<(), StoreError> {
        bilirank_db::touch_task_heartbeat(&self.pool, task_id)
            .await
            .map_err(|e| match e {
                DbError::NotFound => StoreError::NotFound(task_id.to_string()),
                other => StoreError::Db(other),
            })
    }

    async fn mark_completed(
        &self,
        task_id: &str,
        report_id: Option<i64>,
        message: &str,
    ) -> Result<(), StoreError> {
        bilirank_db::complete_task(&self.pool, task_id, report_id, message).await?;
        Ok(())
    }

    async fn mark_failed(&self, task_id: &str, error: &str) -> Result<(), StoreError> {
        bilirank_db::fail_task(&self.pool, task_id, error).await?;
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        match bilirank_db::get_task(&self.pool, task_id).await {
            Ok(row) => Ok(Some(row.into_record()?)),
            Err(DbError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_active(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let rows = bilirank_db::list_active_tasks(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let task_id = row.task_id.clone();
            match row.into_record() {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(task_id = %task_id, error = %e, "skipping undecodable task row");
                }
            }
        }
        Ok(records)
    }

    async fn fail_stale(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<String>, StoreError> {
        Ok(bilirank_db::fail_stale_tasks(&self.pool, cutoff, error).await?)
    }

    async fn save_report(&self, task_id: &str, report: &ReportData) -> Result<i64, StoreError> {
        Ok(bilirank_db::insert_report(&self.pool, task_id, &report.category, report).await?)
    }

    async fn save_raw_comments(
        &self,
        task_id: &str,
        comments: &[RawComment],
    ) -> Result<u64, StoreError> {
        Ok(bilirank_db::insert_raw_comments(&self.pool, task_id, comments).await?)
    }

    async fn purge_raw_comments(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(bilirank_db::purge_raw_comments_older_than(&self.pool, cutoff).await?)
    }
}
