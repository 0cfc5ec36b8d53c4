use std::collections::BTreeMap;

use async_trait::async_trait;
use bilirank_core::{RawComment, TaskRecord, TaskStage};
use bilirank_report::ReportData;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{StoreError, TaskStore};

#[derive(Debug, Default)]
struct State {
    tasks: BTreeMap<String, TaskRecord>,
    reports: BTreeMap<i64, (String, ReportData)>,
    raw_comments: Vec<(String, DateTime<Utc>, RawComment)>,
}

/// In-process [`TaskStore`] for tests and database-less CLI runs.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    state: RwLock<State>,
}

impl MemoryTaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn report(&self, id: i64) -> Option<ReportData> {
        self.state
            .read()
            .await
            .reports
            .get(&id)
            .map(|(_, report)| report.clone())
    }

    pub async fn raw_comment_count(&self, task_id: &str) -> usize {
        self.state
            .read()
            .await
            .raw_comments
            .iter()
            .filter(|(id, _, _)| id == task_id)
            .count()
    }

    /// Overwrites a stored heartbeat. Used to age tasks in tests.
    pub async fn set_heartbeat(&self, task_id: &str, heartbeat: Option<DateTime<Utc>>) {
        if let Some(record) = self.state.write().await.tasks.get_mut(task_id) {
            record.heartbeat_at = heartbeat;
        }
    }
}

fn active_mut<'a>(
    state: &'a mut State,
    task_id: &str,
    next: TaskStage,
) -> Result<&'a mut TaskRecord, StoreError> {
    let record = state
        .tasks
        .get_mut(task_id)
        .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
    record.stage.check_transition(next)?;
    Ok(record)
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.tasks.contains_key(&record.task_id) {
            return Err(StoreError::Duplicate(record.task_id.clone()));
        }
        state.tasks.insert(record.task_id.clone(), record.clone());
        Ok(())
    }

    async fn update_progress(
        &self,
        task_id: &str,
        stage: TaskStage,
        progress: u8,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = active_mut(&mut state, task_id, stage)?;
        record.stage = stage;
        record.progress = record.progress.max(progress.min(100));
        record.message = message.to_string();
        record.heartbeat_at = Some(Utc::now());
        Ok(())
    }

    async fn touch_heartbeat(&self, task_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = state
            .tasks
            .get_mut(task_id)
            .filter(|r| !r.stage.is_terminal())
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        record.heartbeat_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_completed(
        &self,
        task_id: &str,
        report_id: Option<i64>,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = active_mut(&mut state, task_id, TaskStage::Completed)?;
        record.stage = TaskStage::Completed;
        record.progress = 100;
        record.message = message.to_string();
        record.report_id = report_id;
        record.heartbeat_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_failed(&self, task_id: &str, error: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = active_mut(&mut state, task_id, TaskStage::Failed)?;
        record.stage = TaskStage::Failed;
        record.error_message = Some(error.to_string());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.state.read().await.tasks.get(task_id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.state.read().await;
        let mut active: Vec<TaskRecord> = state
            .tasks
            .values()
            .filter(|r| !r.stage.is_terminal())
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        Ok(active)
    }

    async fn fail_stale(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut state = self.state.write().await;
        let mut failed = Vec::new();
        for record in state.tasks.values_mut() {
            let stale = record.heartbeat_at.is_some_and(|beat| beat < cutoff);
            if stale && !record.stage.is_terminal() {
                record.stage = TaskStage::Failed;
                record.error_message = Some(error.to_string());
                failed.push(record.task_id.clone());
            }
        }
        Ok(failed)
    }

    async fn save_report(&self, task_id: &str, report: &ReportData) -> Result<i64, StoreError> {
        let mut state = self.state.write().await;
        let id = state.reports.keys().next_back().map_or(1, |last| last + 1);
        state
            .reports
            .insert(id, (task_id.to_string(), report.clone()));
        Ok(id)
    }

    async fn save_raw_comments(
        &self,
        task_id: &str,
        comments: &[RawComment],
    ) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut written = 0u64;
        for comment in comments {
            for c in std::iter::once(comment).chain(comment.replies.iter()) {
                let mut flat = c.clone();
                flat.replies.clear();
                state.raw_comments.push((task_id.to_string(), now, flat));
                written += 1;
            }
        }
        Ok(written)
    }

    async fn purge_raw_comments(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.raw_comments.len();
        state.raw_comments.retain(|(_, stored_at, _)| *stored_at >= cutoff);
        Ok(u64::try_from(before - state.raw_comments.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use bilirank_core::{CoreError, TaskRequest};
    use chrono::Duration;

    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::new(
            TaskRequest::new("耳机", vec!["耳机 推荐".to_string()], vec![], vec![]),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = MemoryTaskStore::new();
        let r = record();
        store.create(&r).await.unwrap();
        let result = store.create(&r).await;
        assert!(
            matches!(result, Err(StoreError::Duplicate(_))),
            "expected Duplicate, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn backward_stage_is_rejected() {
        let store = MemoryTaskStore::new();
        let r = record();
        store.create(&r).await.unwrap();
        store
            .update_progress(&r.task_id, TaskStage::Analyzing, 50, "")
            .await
            .unwrap();

        let result = store
            .update_progress(&r.task_id, TaskStage::Scraping, 60, "")
            .await;
        assert!(
            matches!(
                result,
                Err(StoreError::Transition(CoreError::IllegalTransition { .. }))
            ),
            "expected IllegalTransition, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn progress_is_clamped_upwards() {
        let store = MemoryTaskStore::new();
        let r = record();
        store.create(&r).await.unwrap();
        store
            .update_progress(&r.task_id, TaskStage::Scraping, 40, "a")
            .await
            .unwrap();
        store
            .update_progress(&r.task_id, TaskStage::Scraping, 25, "b")
            .await
            .unwrap();
        let stored = store.get(&r.task_id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 40);
        assert_eq!(stored.message, "b");
    }

    #[tokio::test]
    async fn terminal_task_cannot_be_reopened() {
        let store = MemoryTaskStore::new();
        let r = record();
        store.create(&r).await.unwrap();
        store.mark_failed(&r.task_id, "boom").await.unwrap();

        assert!(store.mark_completed(&r.task_id, None, "").await.is_err());
        assert!(store.touch_heartbeat(&r.task_id).await.is_err());
        assert!(store.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fail_stale_skips_fresh_and_legacy_records() {
        let store = MemoryTaskStore::new();
        let old = record();
        let fresh = record();
        let legacy = record();
        for r in [&old, &fresh, &legacy] {
            store.create(r).await.unwrap();
        }
        store
            .set_heartbeat(&old.task_id, Some(Utc::now() - Duration::hours(2)))
            .await;
        store.set_heartbeat(&legacy.task_id, None).await;

        let failed = store
            .fail_stale(Utc::now() - Duration::hours(1), "timed out")
            .await
            .unwrap();

        assert_eq!(failed, vec![old.task_id.clone()]);
        assert_eq!(store.list_active().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn raw_comments_flatten_replies_and_purge() {
        let store = MemoryTaskStore::new();
        let root = RawComment {
            rpid: 1,
            replies: vec![RawComment {
                rpid: 2,
                ..RawComment::default()
            }],
            ..RawComment::default()
        };
        assert_eq!(store.save_raw_comments("t", &[root]).await.unwrap(), 2);
        assert_eq!(store.raw_comment_count("t").await, 2);

        let purged = store
            .purge_raw_comments(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 2);
        assert_eq!(store.raw_comment_count("t").await, 0);
    }
}
