//! Bounded concurrent comment scraping across many videos.

mod allocation;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bilirank_core::{cancellable, RawComment, TaskLimits, VideoItem};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::BilibiliClient;
use crate::error::BilibiliError;

pub use allocation::allocate_comments;

/// Anything that can list a video's comments. Implemented by
/// [`BilibiliClient`]; tests substitute an in-memory source.
#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn video_comments(
        &self,
        bvid: &str,
        max: usize,
        fetch_replies: bool,
        delay: Duration,
    ) -> Result<Vec<RawComment>, BilibiliError>;
}

#[async_trait]
impl CommentSource for BilibiliClient {
    async fn video_comments(
        &self,
        bvid: &str,
        max: usize,
        fetch_replies: bool,
        delay: Duration,
    ) -> Result<Vec<RawComment>, BilibiliError> {
        self.get_video_comments(bvid, max, fetch_replies, delay)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub max_videos: usize,
    /// Quota for videos missing from the allocation map.
    pub max_comments_per_video: usize,
    pub max_concurrency: usize,
    pub fetch_replies: bool,
    /// Pause between comment pages of one video.
    pub request_delay: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_videos: 50,
            max_comments_per_video: 500,
            max_concurrency: 5,
            fetch_replies: true,
            request_delay: Duration::from_millis(200),
        }
    }
}

impl ScraperConfig {
    #[must_use]
    pub fn from_limits(limits: &TaskLimits) -> Self {
        Self {
            max_comments_per_video: limits.max_comments_per_video,
            max_concurrency: limits.max_concurrency.max(1),
            request_delay: Duration::from_millis(limits.request_delay_ms),
            ..Self::default()
        }
    }
}

/// Reported after every finished video, success or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeProgress {
    pub completed: usize,
    pub total: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeStats {
    /// Videos whose comments were fetched successfully.
    pub total_videos: usize,
    pub total_comments: usize,
    pub total_replies: usize,
    pub duration: Duration,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeResult {
    /// Input videos, in input order.
    pub videos: Vec<VideoItem>,
    /// Comments per bvid, in API order within each video.
    pub comments: BTreeMap<String, Vec<RawComment>>,
    pub stats: ScrapeStats,
    /// Set when cancellation stopped the run before every video finished.
    pub cancelled: bool,
}

pub struct Scraper<S> {
    source: Arc<S>,
    config: ScraperConfig,
}

impl<S: CommentSource> Scraper<S> {
    #[must_use]
    pub fn new(source: Arc<S>, config: ScraperConfig) -> Self {
        Self { source, config }
    }

    #[must_use]
    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Fetches comments for up to `max_videos` of `videos` with at most
    /// `max_concurrency` in flight.
    ///
    /// Each video's quota comes from `allocation`, falling back to
    /// `max_comments_per_video`. A failing video is recorded in
    /// `stats.errors` and does not affect the others. Once `cancel` fires no
    /// further videos start and in-flight fetches are dropped; whatever
    /// completed is returned.
    pub async fn scrape_videos<F>(
        &self,
        videos: &[VideoItem],
        allocation: &BTreeMap<String, usize>,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> ScrapeResult
    where
        F: FnMut(ScrapeProgress),
    {
        let started = Instant::now();
        let videos: Vec<VideoItem> = videos
            .iter()
            .take(self.config.max_videos)
            .cloned()
            .collect();
        let total = videos.len();
        let mut result = ScrapeResult {
            videos: videos.clone(),
            ..ScrapeResult::default()
        };
        if total == 0 {
            return result;
        }

        let concurrency = self.config.max_concurrency.max(1);
        tracing::info!(videos = total, concurrency, "scraping comments");

        let fetches: Vec<_> = videos
            .iter()
            .map(|video| {
                let quota = allocation
                    .get(&video.bvid)
                    .copied()
                    .unwrap_or(self.config.max_comments_per_video);
                let source = Arc::clone(&self.source);
                async move {
                    if cancel.is_cancelled() {
                        return (video, None);
                    }
                    let fetch = source.video_comments(
                        &video.bvid,
                        quota,
                        self.config.fetch_replies,
                        self.config.request_delay,
                    );
                    (video, cancellable(cancel, fetch).await)
                }
            })
            .collect();
        let mut outcomes = stream::iter(fetches).buffer_unordered(concurrency);

        let mut completed = 0usize;
        let mut skipped = 0usize;
        while let Some((video, outcome)) = outcomes.next().await {
            let Some(outcome) = outcome else {
                skipped += 1;
                continue;
            };
            completed += 1;
            match outcome {
                Ok(comments) => {
                    let replies: usize = comments.iter().map(|c| c.replies.len()).sum();
                    result.stats.total_videos += 1;
                    result.stats.total_comments += comments.len();
                    result.stats.total_replies += replies;
                    tracing::debug!(bvid = %video.bvid, comments = comments.len(), replies, "video scraped");
                    result.comments.insert(video.bvid.clone(), comments);
                }
                Err(e) => {
                    tracing::warn!(bvid = %video.bvid, error = %e, "video scrape failed");
                    result
                        .stats
                        .errors
                        .push(format!("video {} failed: {e}", video.bvid));
                }
            }
            on_progress(ScrapeProgress {
                completed,
                total,
                message: format!(
                    "已抓取 {completed}/{total} 个视频，共 {} 条评论",
                    result.stats.total_comments
                ),
            });
        }

        if skipped > 0 {
            result.cancelled = true;
            tracing::info!(skipped, completed, "scrape cancelled");
        }
        result.stats.duration = started.elapsed();
        tracing::info!(
            videos = result.stats.total_videos,
            comments = result.stats.total_comments,
            replies = result.stats.total_replies,
            errors = result.stats.errors.len(),
            elapsed_ms = u64::try_from(result.stats.duration.as_millis()).unwrap_or(u64::MAX),
            "scrape finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Serves `per_video` synthetic comments, failing for bvids in `failing`.
    #[derive(Default)]
    struct FakeSource {
        failing: HashSet<String>,
        per_video: usize,
        latency: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        requested: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl CommentSource for FakeSource {
        async fn video_comments(
            &self,
            bvid: &str,
            max: usize,
            _fetch_replies: bool,
            _delay: Duration,
        ) -> Result<Vec<RawComment>, BilibiliError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.requested
                .lock()
                .unwrap()
                .push((bvid.to_string(), max));
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(bvid) {
                return Err(BilibiliError::Api {
                    code: -404,
                    message: "啥都木有".to_string(),
                });
            }
            Ok((0..self.per_video.min(max))
                .map(|i| RawComment {
                    rpid: i64::try_from(i).unwrap(),
                    video_bvid: bvid.to_string(),
                    content: format!("comment {i}"),
                    replies: vec![RawComment::default()],
                    ..RawComment::default()
                })
                .collect())
        }
    }

    fn videos(n: usize) -> Vec<VideoItem> {
        (0..n)
            .map(|i| VideoItem {
                bvid: format!("BV{i:02}"),
                ..VideoItem::default()
            })
            .collect()
    }

    fn config(max_concurrency: usize) -> ScraperConfig {
        ScraperConfig {
            max_concurrency,
            request_delay: Duration::ZERO,
            ..ScraperConfig::default()
        }
    }

    #[tokio::test]
    async fn never_exceeds_max_concurrency() {
        let source = Arc::new(FakeSource {
            per_video: 3,
            latency: Duration::from_millis(20),
            ..FakeSource::default()
        });
        let scraper = Scraper::new(Arc::clone(&source), config(3));
        let result = scraper
            .scrape_videos(&videos(12), &BTreeMap::new(), &CancellationToken::new(), |_| {})
            .await;

        assert_eq!(result.stats.total_videos, 12);
        assert_eq!(result.stats.total_comments, 36);
        assert_eq!(result.stats.total_replies, 36);
        let peak = source.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {peak}");
        assert!(peak >= 2, "expected parallelism, peak was {peak}");
    }

    #[tokio::test]
    async fn failures_are_isolated_and_recorded() {
        let source = Arc::new(FakeSource {
            per_video: 2,
            failing: HashSet::from(["BV01".to_string()]),
            ..FakeSource::default()
        });
        let scraper = Scraper::new(source, config(2));
        let mut progress = Vec::new();
        let result = scraper
            .scrape_videos(&videos(3), &BTreeMap::new(), &CancellationToken::new(), |p| {
                progress.push(p);
            })
            .await;

        assert_eq!(result.stats.total_videos, 2);
        assert_eq!(result.stats.errors.len(), 1);
        assert!(result.stats.errors[0].starts_with("video BV01 failed:"));
        assert!(!result.comments.contains_key("BV01"));
        assert_eq!(progress.len(), 3);
        assert_eq!(progress.last().map(|p| p.completed), Some(3));
        assert!(progress.iter().all(|p| p.total == 3));
    }

    #[tokio::test]
    async fn allocation_sets_per_video_quota() {
        let source = Arc::new(FakeSource {
            per_video: 100,
            ..FakeSource::default()
        });
        let scraper = Scraper::new(Arc::clone(&source), config(1));
        let allocation = BTreeMap::from([("BV00".to_string(), 7)]);
        let result = scraper
            .scrape_videos(&videos(2), &allocation, &CancellationToken::new(), |_| {})
            .await;

        assert_eq!(result.comments["BV00"].len(), 7);
        // BV01 falls back to max_comments_per_video (500), capped by the source.
        assert_eq!(result.comments["BV01"].len(), 100);
        let requested = source.requested.lock().unwrap().clone();
        assert!(requested.contains(&("BV01".to_string(), 500)));
    }

    #[tokio::test]
    async fn videos_beyond_max_videos_are_ignored() {
        let source = Arc::new(FakeSource {
            per_video: 1,
            ..FakeSource::default()
        });
        let scraper = Scraper::new(
            source,
            ScraperConfig {
                max_videos: 2,
                ..config(4)
            },
        );
        let result = scraper
            .scrape_videos(&videos(5), &BTreeMap::new(), &CancellationToken::new(), |_| {})
            .await;
        assert_eq!(result.videos.len(), 2);
        assert_eq!(result.comments.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_token_starts_nothing() {
        let source = Arc::new(FakeSource {
            per_video: 1,
            ..FakeSource::default()
        });
        let scraper = Scraper::new(Arc::clone(&source), config(2));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = scraper
            .scrape_videos(&videos(4), &BTreeMap::new(), &cancel, |_| {})
            .await;

        assert!(result.cancelled);
        assert!(result.comments.is_empty());
        assert!(source.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_run_keeps_completed_work() {
        let source = Arc::new(FakeSource {
            per_video: 1,
            latency: Duration::from_millis(30),
            ..FakeSource::default()
        });
        let scraper = Scraper::new(Arc::clone(&source), config(1));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let result = scraper
            .scrape_videos(&videos(6), &BTreeMap::new(), &cancel, move |p| {
                if p.completed == 2 {
                    trigger.cancel();
                }
            })
            .await;

        assert!(result.cancelled);
        assert_eq!(result.comments.len(), 2);
        assert_eq!(result.stats.total_videos, 2);
    }
}
