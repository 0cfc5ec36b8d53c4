//! Live integration tests for bilirank-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/bilirank-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use bilirank_core::{Dimension, RawComment, TaskRecord, TaskRequest, TaskStage};
use bilirank_db::{
    complete_task, fail_stale_tasks, fail_task, get_report, get_report_for_task, get_task,
    insert_raw_comments, insert_report, insert_task, list_active_tasks,
    purge_raw_comments_older_than, touch_task_heartbeat, update_task_progress, DbError,
};
use chrono::{Duration, Utc};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_record() -> TaskRecord {
    let request = TaskRequest::new(
        "吸尘器",
        vec!["吸尘器 推荐".to_string()],
        vec!["戴森".to_string(), "小米".to_string()],
        vec![Dimension::new("吸力", "清洁能力")],
    );
    TaskRecord::new(request, Utc::now())
}

async fn insert_fresh(pool: &sqlx::PgPool) -> TaskRecord {
    let record = make_record();
    insert_task(pool, &record)
        .await
        .unwrap_or_else(|e| panic!("insert_task failed for {}: {e}", record.task_id));
    record
}

fn comment(rpid: i64, replies: Vec<RawComment>) -> RawComment {
    RawComment {
        rpid,
        video_bvid: "BV1xx411c7mD".to_string(),
        content: format!("评论 {rpid}"),
        like: 2,
        replies,
        ..RawComment::default()
    }
}

// ---------------------------------------------------------------------------
// Section 1: Task lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn task_round_trips_through_row(pool: sqlx::PgPool) {
    let record = insert_fresh(&pool).await;

    let loaded = get_task(&pool, &record.task_id)
        .await
        .expect("get_task failed")
        .into_record()
        .expect("row should decode");

    assert_eq!(loaded.request, record.request);
    assert_eq!(loaded.stage, TaskStage::Searching);
    assert_eq!(loaded.progress, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn task_lifecycle_searching_to_completed(pool: sqlx::PgPool) {
    let record = insert_fresh(&pool).await;
    let id = record.task_id.as_str();

    update_task_progress(&pool, id, TaskStage::Scraping, 20, "正在抓取评论")
        .await
        .expect("scraping");
    update_task_progress(&pool, id, TaskStage::Analyzing, 50, "正在分析")
        .await
        .expect("analyzing");

    let report_id = insert_report(&pool, id, "吸尘器", &serde_json::json!({"brands": []}))
        .await
        .expect("insert_report");
    complete_task(&pool, id, Some(report_id), "分析完成")
        .await
        .expect("complete");

    let row = get_task(&pool, id).await.expect("get_task");
    assert_eq!(row.stage, "completed");
    assert_eq!(row.progress, 100);
    assert_eq!(row.report_id, Some(report_id));
    assert!(list_active_tasks(&pool).await.expect("list").is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn task_stage_cannot_move_backwards(pool: sqlx::PgPool) {
    let record = insert_fresh(&pool).await;
    let id = record.task_id.as_str();

    update_task_progress(&pool, id, TaskStage::Analyzing, 50, "")
        .await
        .expect("analyzing");
    let result = update_task_progress(&pool, id, TaskStage::Scraping, 60, "").await;

    assert!(
        matches!(
            result,
            Err(DbError::InvalidTaskTransition {
                to: TaskStage::Scraping,
                ..
            })
        ),
        "expected InvalidTaskTransition, got: {result:?}"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn task_progress_never_decreases(pool: sqlx::PgPool) {
    let record = insert_fresh(&pool).await;
    let id = record.task_id.as_str();

    update_task_progress(&pool, id, TaskStage::Scraping, 40, "")
        .await
        .expect("first");
    update_task_progress(&pool, id, TaskStage::Scraping, 30, "")
        .await
        .expect("second");

    let row = get_task(&pool, id).await.expect("get_task");
    assert_eq!(row.progress, 40);
}

#[sqlx::test(migrations = "../../migrations")]
async fn finished_task_cannot_be_failed(pool: sqlx::PgPool) {
    let record = insert_fresh(&pool).await;
    let id = record.task_id.as_str();

    complete_task(&pool, id, None, "").await.expect("complete");
    let result = fail_task(&pool, id, "boom").await;
    assert!(matches!(result, Err(DbError::InvalidTaskTransition { .. })));
}

#[sqlx::test(migrations = "../../migrations")]
async fn fail_task_stores_message(pool: sqlx::PgPool) {
    let record = insert_fresh(&pool).await;

    fail_task(&pool, &record.task_id, "未找到相关视频")
        .await
        .expect("fail");

    let row = get_task(&pool, &record.task_id).await.expect("get_task");
    assert_eq!(row.stage, "failed");
    assert_eq!(row.error_message.as_deref(), Some("未找到相关视频"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn get_unknown_task_is_not_found(pool: sqlx::PgPool) {
    let result = get_task(&pool, "missing").await;
    assert!(matches!(result, Err(DbError::NotFound)));
    let result = touch_task_heartbeat(&pool, "missing").await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

// ---------------------------------------------------------------------------
// Section 2: Stale sweep
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn stale_sweep_fails_only_old_heartbeats(pool: sqlx::PgPool) {
    let mut old = make_record();
    old.heartbeat_at = Some(Utc::now() - Duration::hours(3));
    insert_task(&pool, &old).await.expect("insert old");

    let fresh = insert_fresh(&pool).await;

    let mut legacy = make_record();
    legacy.heartbeat_at = None;
    insert_task(&pool, &legacy).await.expect("insert legacy");

    let failed = fail_stale_tasks(&pool, Utc::now() - Duration::hours(1), "任务超时")
        .await
        .expect("sweep");

    assert_eq!(failed, vec![old.task_id.clone()]);
    let active: Vec<String> = list_active_tasks(&pool)
        .await
        .expect("list")
        .into_iter()
        .map(|r| r.task_id)
        .collect();
    assert!(active.contains(&fresh.task_id));
    assert!(active.contains(&legacy.task_id));
}

// ---------------------------------------------------------------------------
// Section 3: Raw comments and reports
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn raw_comments_store_replies_once(pool: sqlx::PgPool) {
    let record = insert_fresh(&pool).await;
    let comments = vec![
        comment(1, vec![comment(11, vec![]), comment(12, vec![])]),
        comment(2, vec![]),
    ];

    let first = insert_raw_comments(&pool, &record.task_id, &comments)
        .await
        .expect("insert");
    let second = insert_raw_comments(&pool, &record.task_id, &comments)
        .await
        .expect("re-insert");

    assert_eq!(first, 4);
    assert_eq!(second, 0);

    let parent: Option<i64> =
        sqlx::query_scalar("SELECT parent_rpid FROM raw_comments WHERE rpid = 11")
            .fetch_one(&pool)
            .await
            .expect("select");
    assert_eq!(parent, Some(1));
}

#[sqlx::test(migrations = "../../migrations")]
async fn purge_removes_rows_before_cutoff(pool: sqlx::PgPool) {
    let record = insert_fresh(&pool).await;
    insert_raw_comments(&pool, &record.task_id, &[comment(1, vec![]), comment(2, vec![])])
        .await
        .expect("insert");
    sqlx::query("UPDATE raw_comments SET created_at = NOW() - INTERVAL '5 days' WHERE rpid = 1")
        .execute(&pool)
        .await
        .expect("age row");

    let removed = purge_raw_comments_older_than(&pool, Utc::now() - Duration::days(3))
        .await
        .expect("purge");

    assert_eq!(removed, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn latest_report_for_task_wins(pool: sqlx::PgPool) {
    let record = insert_fresh(&pool).await;
    let first = insert_report(&pool, &record.task_id, "吸尘器", &serde_json::json!({"v": 1}))
        .await
        .expect("first");
    let second = insert_report(&pool, &record.task_id, "吸尘器", &serde_json::json!({"v": 2}))
        .await
        .expect("second");

    assert_eq!(get_report(&pool, first).await.expect("get").report["v"], 1);
    let latest = get_report_for_task(&pool, &record.task_id)
        .await
        .expect("latest");
    assert_eq!(latest.id, second);
}
