use async_trait::async_trait;
use bilirank_bilibili::{BilibiliClient, BilibiliError, CommentSource};
use bilirank_core::VideoItem;

/// Keyword search over the platform. Implemented by [`BilibiliClient`];
/// tests substitute canned results.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(
        &self,
        keyword: &str,
        max_videos: usize,
        min_duration_secs: u32,
    ) -> Result<Vec<VideoItem>, BilibiliError>;
}

#[async_trait]
impl VideoSearch for BilibiliClient {
    async fn search(
        &self,
        keyword: &str,
        max_videos: usize,
        min_duration_secs: u32,
    ) -> Result<Vec<VideoItem>, BilibiliError> {
        self.search_videos_with_limit(keyword, max_videos, min_duration_secs)
            .await
    }
}

/// Everything the executor needs from the video platform.
pub trait Platform: VideoSearch + CommentSource + 'static {}

impl<T: VideoSearch + CommentSource + 'static> Platform for T {}
