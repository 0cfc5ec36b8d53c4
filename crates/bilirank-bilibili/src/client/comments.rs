use std::time::Duration;

use bilirank_core::RawComment;

use super::BilibiliClient;
use crate::bvid::{decode_bvid, encode_avid};
use crate::error::BilibiliError;
use crate::types::CommentPageData;

/// Upper bound the comment endpoints accept for `ps`.
pub const COMMENT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MAX_REPLIES: usize = 10;

const DEFAULT_MAX_COMMENTS: usize = 500;
const MAX_COMMENT_PAGES: u32 = 50;
const MAX_REPLY_PAGES: u32 = 10;
/// Sort root comments by like count.
const SORT_BY_LIKES: &str = "1";

/// One page of root comments or nested replies.
#[derive(Debug, Clone, Default)]
pub struct CommentPage {
    pub comments: Vec<RawComment>,
    /// Total reported by the endpoint.
    pub total: u64,
}

fn clamp_page_size(page_size: u32) -> u32 {
    if page_size == 0 || page_size > COMMENT_PAGE_SIZE {
        COMMENT_PAGE_SIZE
    } else {
        page_size
    }
}

fn into_page(data: CommentPageData, bvid: &str) -> CommentPage {
    CommentPage {
        comments: data
            .replies
            .unwrap_or_default()
            .into_iter()
            .map(|item| item.into_raw_comment(bvid))
            .collect(),
        total: data.page.count,
    }
}

impl BilibiliClient {
    /// Fetches one page of root comments on video `aid`, ordered by likes.
    ///
    /// # Errors
    ///
    /// [`BilibiliError::Api`] for a non-zero envelope code, plus transport and
    /// decode errors after retries are exhausted.
    pub async fn get_comments(
        &self,
        aid: u64,
        page: u32,
        page_size: u32,
    ) -> Result<CommentPage, BilibiliError> {
        let params = [
            ("type", "1".to_string()),
            ("oid", aid.to_string()),
            ("pn", page.max(1).to_string()),
            ("ps", clamp_page_size(page_size).to_string()),
            ("sort", SORT_BY_LIKES.to_string()),
        ];
        let data: CommentPageData = self.get_data("/x/v2/reply", &params, "comments").await?;
        Ok(into_page(data, &encode_avid(aid)))
    }

    /// Fetches one page of nested replies under root comment `root`.
    ///
    /// # Errors
    ///
    /// Same as [`BilibiliClient::get_comments`].
    pub async fn get_replies(
        &self,
        aid: u64,
        root: i64,
        page: u32,
        page_size: u32,
    ) -> Result<CommentPage, BilibiliError> {
        let params = [
            ("type", "1".to_string()),
            ("oid", aid.to_string()),
            ("root", root.to_string()),
            ("pn", page.max(1).to_string()),
            ("ps", clamp_page_size(page_size).to_string()),
        ];
        let data: CommentPageData = self
            .get_data("/x/v2/reply/reply", &params, "replies")
            .await?;
        Ok(into_page(data, &encode_avid(aid)))
    }

    /// Collects up to `max` nested replies (`0` means 10) under `root`,
    /// paging until an empty page, the reported total, or 10 pages.
    ///
    /// # Errors
    ///
    /// Propagates the first page error.
    pub async fn get_all_replies(
        &self,
        aid: u64,
        root: i64,
        max: usize,
    ) -> Result<Vec<RawComment>, BilibiliError> {
        let max = if max == 0 { DEFAULT_MAX_REPLIES } else { max };
        let delay = Duration::from_millis(self.options.reply_page_delay_ms);

        let mut replies: Vec<RawComment> = Vec::new();
        for page in 1..=MAX_REPLY_PAGES {
            let result = self
                .get_replies(aid, root, page, COMMENT_PAGE_SIZE)
                .await?;
            if result.comments.is_empty() {
                break;
            }
            replies.extend(result.comments);

            let reached_total = result.total > 0 && replies.len() as u64 >= result.total;
            if replies.len() >= max || reached_total {
                break;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        replies.truncate(max);
        Ok(replies)
    }

    /// Collects up to `max` root comments (`0` means 500) for `bvid`.
    ///
    /// Pages of 20, at most 50 pages, `delay` between pages. Paging stops
    /// early on an empty page or once the reported root total is reached. With
    /// `fetch_replies`, comments that report replies get up to 10 nested
    /// replies each; a failed reply fetch is logged and skipped.
    ///
    /// # Errors
    ///
    /// - [`BilibiliError::InvalidBvid`] if `bvid` does not decode.
    /// - The first root-comment page error.
    pub async fn get_video_comments(
        &self,
        bvid: &str,
        max: usize,
        fetch_replies: bool,
        delay: Duration,
    ) -> Result<Vec<RawComment>, BilibiliError> {
        let aid = decode_bvid(bvid);
        if aid == 0 {
            return Err(BilibiliError::InvalidBvid(bvid.to_string()));
        }
        let max = if max == 0 { DEFAULT_MAX_COMMENTS } else { max };

        let mut comments: Vec<RawComment> = Vec::new();
        let mut seen: u64 = 0;
        for page in 1..=MAX_COMMENT_PAGES {
            let result = self.get_comments(aid, page, COMMENT_PAGE_SIZE).await?;
            if result.comments.is_empty() {
                break;
            }
            tracing::debug!(bvid, page, count = result.comments.len(), "comment page");
            seen += result.comments.len() as u64;
            let reached_total = result.total > 0 && seen >= result.total;

            for mut comment in result.comments {
                if comments.len() >= max {
                    break;
                }
                comment.video_bvid = bvid.to_string();
                if fetch_replies && comment.reply_count > 0 {
                    match self
                        .get_all_replies(aid, comment.rpid, DEFAULT_MAX_REPLIES)
                        .await
                    {
                        Ok(replies) => {
                            comment.replies = replies
                                .into_iter()
                                .map(|mut r| {
                                    r.video_bvid = bvid.to_string();
                                    r
                                })
                                .collect();
                        }
                        Err(e) => {
                            tracing::warn!(bvid, rpid = comment.rpid, error = %e, "reply fetch failed, skipping");
                        }
                    }
                }
                comments.push(comment);
            }

            if comments.len() >= max || reached_total {
                break;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        comments.truncate(max);
        Ok(comments)
    }
}
