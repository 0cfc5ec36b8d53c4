//! Housekeeping that runs outside any one task.

use chrono::Utc;

use crate::recovery::TIMEOUT_MESSAGE;
use crate::store::{StoreError, TaskStore};

/// Fails every active task whose heartbeat is older than `stale_after`.
/// Returns the ids that were failed.
///
/// # Errors
///
/// Returns [`StoreError`] if the sweep query fails.
pub async fn cleanup_timed_out_tasks(
    store: &dyn TaskStore,
    stale_after: chrono::Duration,
) -> Result<Vec<String>, StoreError> {
    let cutoff = Utc::now() - stale_after;
    let failed = store.fail_stale(cutoff, TIMEOUT_MESSAGE).await?;
    if !failed.is_empty() {
        tracing::warn!(count = failed.len(), tasks = ?failed, "marked timed out tasks as failed");
    }
    Ok(failed)
}

/// Deletes raw comments stored more than `retention_days` ago. Returns the
/// number of rows removed.
///
/// # Errors
///
/// Returns [`StoreError`] if the delete fails.
pub async fn purge_raw_comments(
    store: &dyn TaskStore,
    retention_days: u32,
) -> Result<u64, StoreError> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    let purged = store.purge_raw_comments(cutoff).await?;
    tracing::info!(purged, retention_days, "purged expired raw comments");
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use bilirank_core::{RawComment, TaskRecord, TaskRequest, TaskStage};

    use super::*;
    use crate::store::MemoryTaskStore;

    async fn seeded(store: &MemoryTaskStore, heartbeat_age: Option<i64>) -> String {
        let request = TaskRequest::new("耳机", vec!["耳机".to_string()], vec![], vec![]);
        let record = TaskRecord::new(request, Utc::now());
        store.create(&record).await.unwrap();
        store
            .set_heartbeat(
                &record.task_id,
                heartbeat_age.map(|mins| Utc::now() - chrono::Duration::minutes(mins)),
            )
            .await;
        record.task_id
    }

    #[tokio::test]
    async fn sweep_fails_only_stale_tasks() {
        let store = MemoryTaskStore::new();
        let stale = seeded(&store, Some(90)).await;
        let fresh = seeded(&store, Some(5)).await;
        let legacy = seeded(&store, None).await;

        let failed = cleanup_timed_out_tasks(&store, chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(failed, vec![stale.clone()]);
        let stale = store.get(&stale).await.unwrap().unwrap();
        assert_eq!(stale.stage, TaskStage::Failed);
        assert_eq!(stale.error_message.as_deref(), Some(TIMEOUT_MESSAGE));
        for id in [fresh, legacy] {
            let record = store.get(&id).await.unwrap().unwrap();
            assert_eq!(record.stage, TaskStage::Searching);
        }
    }

    #[tokio::test]
    async fn sweep_skips_finished_tasks() {
        let store = MemoryTaskStore::new();
        let done = seeded(&store, Some(600)).await;
        store.mark_completed(&done, None, "ok").await.unwrap();

        let failed = cleanup_timed_out_tasks(&store, chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(failed.is_empty());
        let record = store.get(&done).await.unwrap().unwrap();
        assert_eq!(record.stage, TaskStage::Completed);
    }

    #[tokio::test]
    async fn purge_keeps_recent_comments() {
        let store = MemoryTaskStore::new();
        let task_id = seeded(&store, Some(0)).await;
        let comment = RawComment {
            rpid: 1,
            video_bvid: "BV1".to_string(),
            content: "刚抓到的评论".to_string(),
            ..RawComment::default()
        };
        store.save_raw_comments(&task_id, &[comment]).await.unwrap();

        let purged = purge_raw_comments(&store, 3).await.unwrap();
        assert_eq!(purged, 0);
        assert_eq!(store.raw_comment_count(&task_id).await, 1);

        let purged = purge_raw_comments(&store, 0).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.raw_comment_count(&task_id).await, 0);
    }
}
