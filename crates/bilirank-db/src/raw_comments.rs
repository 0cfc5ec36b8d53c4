//! Short-lived storage of scraped comments in `raw_comments`.

use bilirank_core::RawComment;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `raw_comments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawCommentRow {
    pub id: i64,
    pub task_id: String,
    pub bvid: String,
    pub rpid: i64,
    pub parent_rpid: Option<i64>,
    pub content: String,
    pub like_count: i64,
    pub reply_count: i64,
    /// Publish time, unix seconds.
    pub ctime: i64,
    pub created_at: DateTime<Utc>,
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Stores root comments and their nested replies for a task.
///
/// Rows already stored for the same `(task_id, rpid)` are skipped, so a
/// recovered task can write its comments again. Returns the number of rows
/// inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; the batch is rolled back.
pub async fn insert_raw_comments(
    pool: &PgPool,
    task_id: &str,
    comments: &[RawComment],
) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    let rows = comments.iter().flat_map(|root| {
        std::iter::once((root, None)).chain(root.replies.iter().map(move |r| (r, Some(root.rpid))))
    })
    .collect::<Vec<_>>();
    for (comment, parent) in rows {
        let result = sqlx::query(
            "INSERT INTO raw_comments \
                 (task_id, bvid, rpid, parent_rpid, content, like_count, reply_count, ctime) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (task_id, rpid) DO NOTHING",
        )
        .bind(task_id)
        .bind(&comment.video_bvid)
        .bind(comment.rpid)
        .bind(parent)
        .bind(&comment.content)
        .bind(saturating_i64(comment.like))
        .bind(saturating_i64(comment.reply_count))
        .bind(comment.ctime)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Deletes raw comments stored before `cutoff`. Returns the number removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_raw_comments_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM raw_comments WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
