use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named evaluation axis scored 1-10 per comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub description: String,
}

impl Dimension {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A video returned by platform search.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoItem {
    pub bvid: String,
    pub aid: u64,
    pub title: String,
    pub author: String,
    pub mid: u64,
    /// View count.
    pub play: u64,
    /// Comment count as reported by search. May be stale or zero.
    pub comment_count: u64,
    pub favorites: u64,
    pub duration_secs: u32,
    /// Publish time, unix seconds.
    pub pubdate: i64,
}

/// A comment as fetched from the platform, with a bounded list of nested
/// replies.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawComment {
    pub rpid: i64,
    pub video_bvid: String,
    pub content: String,
    pub like: u64,
    pub reply_count: u64,
    /// Publish time, unix seconds.
    pub ctime: i64,
    pub member: String,
    #[serde(default)]
    pub replies: Vec<RawComment>,
}

/// One comment handed to the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentInput {
    pub id: String,
    pub content: String,
    pub video_title: String,
    pub video_bvid: String,
}

/// A comment after LLM analysis.
///
/// Either fully scored, or carrying a non-empty `error`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoredComment {
    pub comment_id: String,
    pub content: String,
    pub video_bvid: String,
    pub video_title: String,
    /// Dimension name to score; `None` means the comment did not mention it.
    pub scores: BTreeMap<String, Option<f64>>,
    pub brand: String,
    pub model: String,
    pub error: Option<String>,
}

impl ScoredComment {
    /// An unscored result for `input` carrying `error`.
    #[must_use]
    pub fn failed(input: &CommentInput, error: impl Into<String>) -> Self {
        Self {
            comment_id: input.id.clone(),
            content: input.content.clone(),
            video_bvid: input.video_bvid.clone(),
            video_title: input.video_title.clone(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_scored(&self) -> bool {
        self.error.is_none()
    }

    /// Mean of the non-null scores, or `None` when nothing was scored.
    #[must_use]
    pub fn average_score(&self) -> Option<f64> {
        let values: Vec<f64> = self.scores.values().filter_map(|s| *s).collect();
        if values.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        Some(values.iter().sum::<f64>() / n)
    }
}

/// One brand's place in the ranking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrandRanking {
    pub brand: String,
    pub overall_score: f64,
    /// 1-based.
    pub rank: usize,
    pub scores: BTreeMap<String, f64>,
    /// Scored comments behind this brand.
    pub comment_count: usize,
}

/// One (brand, model) pair's place in the model ranking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelRanking {
    pub model: String,
    pub brand: String,
    pub overall_score: f64,
    pub rank: usize,
    pub scores: BTreeMap<String, f64>,
    pub comment_count: usize,
}

/// Dimensions a brand does well or badly on, in dimension order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BrandAnalysis {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_ignores_null_scores() {
        let mut c = ScoredComment::default();
        c.scores.insert("吸力".into(), Some(9.0));
        c.scores.insert("续航".into(), Some(8.0));
        c.scores.insert("噪音".into(), None);
        assert_eq!(c.average_score(), Some(8.5));
    }

    #[test]
    fn average_is_none_without_scores() {
        let mut c = ScoredComment::default();
        c.scores.insert("吸力".into(), None);
        assert_eq!(c.average_score(), None);
    }

    #[test]
    fn failed_carries_input_identity() {
        let input = CommentInput {
            id: "comment_3".into(),
            content: "还行".into(),
            video_title: "评测".into(),
            video_bvid: "BV1mH4y1u7UA".into(),
        };
        let c = ScoredComment::failed(&input, "boom");
        assert_eq!(c.comment_id, "comment_3");
        assert_eq!(c.error.as_deref(), Some("boom"));
        assert!(!c.is_scored());
    }
}
