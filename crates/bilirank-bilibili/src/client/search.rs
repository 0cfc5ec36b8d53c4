use std::sync::LazyLock;

use bilirank_core::VideoItem;
use regex::Regex;

use super::BilibiliClient;
use crate::error::BilibiliError;
use crate::types::SearchData;

pub const DEFAULT_SEARCH_PAGE_SIZE: u32 = 20;
pub const MAX_SEARCH_PAGE_SIZE: u32 = 50;

const DEFAULT_MAX_VIDEOS: usize = 50;
const MAX_SEARCH_PAGES: u32 = 10;

static HIGHLIGHT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// One page of video search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub videos: Vec<VideoItem>,
    pub num_pages: u32,
    pub num_results: u64,
}

/// Removes the `<em class="keyword">` highlight markup search titles carry and
/// decodes the handful of entities the endpoint escapes.
#[must_use]
pub fn strip_highlight(title: &str) -> String {
    HIGHLIGHT_TAG_RE
        .replace_all(title, "")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

impl BilibiliClient {
    /// Fetches one page of video search results for `keyword`.
    ///
    /// `page_size` of `0` means the default (20); larger values are capped at
    /// 50. Results without a `bvid` are dropped.
    ///
    /// # Errors
    ///
    /// - [`BilibiliError::InvalidInput`] for an empty keyword.
    /// - [`BilibiliError::WbiKeys`] if the signing keys cannot be refreshed.
    /// - [`BilibiliError::Api`] for a non-zero envelope code.
    /// - Transport and decode errors after retries are exhausted.
    pub async fn search_videos(
        &self,
        keyword: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SearchPage, BilibiliError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(BilibiliError::InvalidInput(
                "search keyword is empty".to_string(),
            ));
        }
        let page = page.max(1);
        let page_size = match page_size {
            0 => DEFAULT_SEARCH_PAGE_SIZE,
            n => n.min(MAX_SEARCH_PAGE_SIZE),
        };

        let params = [
            ("search_type", "video".to_string()),
            ("keyword", keyword.to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        let data: SearchData = self
            .get_signed_data("/x/web-interface/wbi/search/type", &params, "search")
            .await?;

        let videos = data
            .result
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !v.bvid.trim().is_empty())
            .map(|v| {
                let title = strip_highlight(&v.title);
                v.into_video_item(title)
            })
            .collect();

        Ok(SearchPage {
            videos,
            num_pages: data.num_pages,
            num_results: data.num_results,
        })
    }

    /// Pages through search results (20 per page, at most 10 pages) until
    /// `max_videos` are collected, a page comes back empty, or the reported
    /// page count is reached.
    ///
    /// Videos shorter than `min_duration_secs` are skipped; `0` disables the
    /// filter and videos with an unknown duration always pass.
    ///
    /// # Errors
    ///
    /// Propagates the first page error from [`BilibiliClient::search_videos`].
    pub async fn search_videos_with_limit(
        &self,
        keyword: &str,
        max_videos: usize,
        min_duration_secs: u32,
    ) -> Result<Vec<VideoItem>, BilibiliError> {
        let max_videos = if max_videos == 0 {
            DEFAULT_MAX_VIDEOS
        } else {
            max_videos
        };

        let mut collected: Vec<VideoItem> = Vec::new();
        for page in 1..=MAX_SEARCH_PAGES {
            let result = self
                .search_videos(keyword, page, DEFAULT_SEARCH_PAGE_SIZE)
                .await?;
            if result.videos.is_empty() {
                break;
            }

            let fetched = result.videos.len();
            collected.extend(result.videos.into_iter().filter(|v| {
                min_duration_secs == 0
                    || v.duration_secs == 0
                    || v.duration_secs >= min_duration_secs
            }));
            tracing::debug!(keyword, page, fetched, kept = collected.len(), "search page");

            if collected.len() >= max_videos || (result.num_pages > 0 && page >= result.num_pages) {
                break;
            }
        }

        collected.truncate(max_videos);
        Ok(collected)
    }
}
