use std::collections::BTreeMap;

use bilirank_core::{BrandAnalysis, BrandRanking, Dimension, ModelRanking, ScoredComment, VideoItem};
use serde::{Deserialize, Serialize};

/// A video the comments were collected from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSource {
    pub bvid: String,
    pub title: String,
    pub author: String,
    pub play: u64,
    pub comment_count: u64,
}

impl From<&VideoItem> for VideoSource {
    fn from(video: &VideoItem) -> Self {
        Self {
            bvid: video.bvid.clone(),
            title: video.title.clone(),
            author: video.author.clone(),
            play: video.play,
            comment_count: video.comment_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordItem {
    pub word: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportStats {
    pub total_videos: usize,
    pub total_comments: usize,
    pub comments_by_brand: BTreeMap<String, usize>,
}

/// Comment counts by average-score band. Percentages are of comments that
/// have an average at all, rounded to one decimal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentStats {
    pub positive_count: usize,
    pub neutral_count: usize,
    pub negative_count: usize,
    pub positive_pct: f64,
    pub neutral_pct: f64,
    pub negative_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypicalComment {
    pub content: String,
    /// Mean of the comment's non-null scores.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub category: String,
    /// Every ranked brand, in ranking order.
    pub brands: Vec<String>,
    pub dimensions: Vec<Dimension>,
    /// Brand -> dimension -> mean score.
    pub scores: BTreeMap<String, BTreeMap<String, f64>>,
    pub rankings: Vec<BrandRanking>,
    pub recommendation: String,
    pub stats: ReportStats,
    pub sentiment_distribution: SentimentStats,
    pub top_comments: BTreeMap<String, Vec<TypicalComment>>,
    pub bad_comments: BTreeMap<String, Vec<TypicalComment>>,
    pub brand_analysis: BTreeMap<String, BrandAnalysis>,
    pub model_rankings: Vec<ModelRanking>,
    pub video_sources: Vec<VideoSource>,
    pub keyword_frequency: Vec<KeywordItem>,
}

/// Everything a report is built from.
#[derive(Debug, Clone, Default)]
pub struct ReportInput {
    pub category: String,
    pub dimensions: Vec<Dimension>,
    /// Scored comments grouped by brand.
    pub results: BTreeMap<String, Vec<ScoredComment>>,
    pub videos: Vec<VideoItem>,
    /// Comments collected before filtering and analysis.
    pub total_comments: usize,
}
