//! Comment quality filter and ranker.
//!
//! Drops comments that are too short or are mostly emoji and symbols, then
//! orders the survivors by a 0-100 quality score built from popularity,
//! length and keyword hits.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use bilirank_core::RawComment;

/// Default minimum comment length, in characters.
pub const DEFAULT_MIN_LENGTH: usize = 10;

const MAX_LIKE_SCORE: f64 = 20.0;
const MAX_REPLY_SCORE: f64 = 20.0;
const MAX_LENGTH_SCORE: f64 = 30.0;
const KEYWORD_HIT_SCORE: f64 = 10.0;
const MAX_KEYWORD_SCORE: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Minimum character count after trimming, and again after stripping
    /// symbols. `0` falls back to [`DEFAULT_MIN_LENGTH`].
    pub min_length: usize,
    /// Keep at most this many comments; `0` keeps all.
    pub max_comments: usize,
    /// Each distinct case-insensitive hit adds to the score.
    pub keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            max_comments: 0,
            keywords: Vec::new(),
        }
    }
}

fn is_valid_comment(content: &str, min_length: usize) -> bool {
    let trimmed = content.trim();
    if trimmed.chars().count() < min_length {
        return false;
    }
    let meaningful = trimmed
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();
    meaningful >= min_length
}

/// Quality score in `[0, 100]`.
///
/// `min(like/100, 20) + min(replies/10, 20) + min(chars/10, 30)` plus 10 per
/// distinct keyword found in the content, capped at 30.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn quality_score(comment: &RawComment, keywords: &[String]) -> f64 {
    let message = comment.content.trim();
    let chars = message.chars().count();

    let like_score = (comment.like as f64 / 100.0).min(MAX_LIKE_SCORE);
    let reply_score = (comment.reply_count as f64 / 10.0).min(MAX_REPLY_SCORE);
    let length_score = (chars as f64 / 10.0).min(MAX_LENGTH_SCORE);

    let lowered = message.to_lowercase();
    let distinct: BTreeSet<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    let hits = distinct.iter().filter(|k| lowered.contains(k.as_str())).count();
    let keyword_score = (hits as f64 * KEYWORD_HIT_SCORE).min(MAX_KEYWORD_SCORE);

    (like_score + reply_score + length_score + keyword_score).clamp(0.0, 100.0)
}

/// Filters `comments` by quality and returns them best first.
///
/// Ties on score fall back to newer first, then more likes, then larger
/// `rpid`, so the order never depends on input order. The input is not
/// modified; the output is a subsequence of it.
#[must_use]
pub fn filter_and_rank(comments: &[RawComment], config: &FilterConfig) -> Vec<RawComment> {
    let min_length = if config.min_length == 0 {
        DEFAULT_MIN_LENGTH
    } else {
        config.min_length
    };

    let mut kept: Vec<(f64, &RawComment)> = comments
        .iter()
        .filter(|c| is_valid_comment(&c.content, min_length))
        .map(|c| (quality_score(c, &config.keywords), c))
        .collect();

    kept.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.ctime.cmp(&a.ctime))
            .then_with(|| b.like.cmp(&a.like))
            .then_with(|| b.rpid.cmp(&a.rpid))
    });

    if config.max_comments > 0 {
        kept.truncate(config.max_comments);
    }
    kept.into_iter().map(|(_, c)| c.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(rpid: i64, content: &str, like: u64, ctime: i64) -> RawComment {
        RawComment {
            rpid,
            content: content.to_string(),
            like,
            ctime,
            ..RawComment::default()
        }
    }

    #[test]
    fn length_is_counted_in_characters() {
        // 10 CJK characters are 30 bytes but exactly the minimum length.
        let ok = comment(1, "吸力很强续航也不错呀", 0, 0);
        let short = comment(2, "吸力很强续航也不错", 0, 0);
        let out = filter_and_rank(&[ok, short], &FilterConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rpid, 1);
    }

    #[test]
    fn symbol_only_comments_are_dropped() {
        let noise = comment(1, "😂😂😂😂😂！！！！！？？？", 0, 0);
        let out = filter_and_rank(&[noise], &FilterConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn surrounding_whitespace_does_not_count() {
        let padded = comment(1, "      短评论      ", 0, 0);
        assert!(filter_and_rank(&[padded], &FilterConfig::default()).is_empty());
    }

    #[test]
    fn score_components_are_capped() {
        let mut c = comment(1, &"好".repeat(500), 1_000_000, 0);
        c.reply_count = 1_000_000;
        let keywords: Vec<String> = ["好", "好好", "好好好", "好好好好"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        assert!((quality_score(&c, &keywords) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn keyword_hits_are_distinct_and_case_insensitive() {
        let c = comment(1, "Dyson V12 比 dyson V10 好用多了", 0, 0);
        let keywords = vec!["DYSON".to_string(), "dyson".to_string(), "v12".to_string()];
        let base = quality_score(&c, &[]);
        assert!((quality_score(&c, &keywords) - base - 20.0).abs() < 1e-9);
    }

    #[test]
    fn ranks_by_score_then_tie_breaks() {
        let popular = comment(1, "这款扫地机器人真的很好用", 5_000, 100);
        let newer = comment(2, "这款扫地机器人真的很好用", 0, 300);
        let older = comment(3, "这款扫地机器人真的很好用", 0, 200);
        let more_liked = comment(4, "这款扫地机器人真的很好用", 50, 200);
        let out = filter_and_rank(
            &[older.clone(), newer, more_liked, popular],
            &FilterConfig::default(),
        );
        let order: Vec<i64> = out.iter().map(|c| c.rpid).collect();
        // 50 likes adds 0.5 to the score, so rpid 4 outranks the newer one.
        assert_eq!(order, vec![1, 4, 2, 3]);
    }

    #[test]
    fn equal_comments_order_by_rpid_desc() {
        let a = comment(10, "完全一样的评论内容在这里", 0, 0);
        let b = comment(20, "完全一样的评论内容在这里", 0, 0);
        let out = filter_and_rank(&[a, b], &FilterConfig::default());
        assert_eq!(out[0].rpid, 20);
    }

    #[test]
    fn truncates_to_max_comments() {
        let comments: Vec<RawComment> = (0..10)
            .map(|i| comment(i, "这是一条足够长的有效评论", 0, i))
            .collect();
        let config = FilterConfig {
            max_comments: 3,
            ..FilterConfig::default()
        };
        let out = filter_and_rank(&comments, &config);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].rpid, 9);
    }

    #[test]
    fn output_is_a_subsequence_of_input() {
        let comments: Vec<RawComment> = (0..20)
            .map(|i| {
                comment(
                    i,
                    &format!("第{i}条评论，内容足够长可以保留"),
                    (i * 37 % 11) as u64,
                    i % 3,
                )
            })
            .collect();
        let out = filter_and_rank(&comments, &FilterConfig::default());
        assert!(out.iter().all(|c| comments.contains(c)));
        for pair in out.windows(2) {
            assert!(quality_score(&pair[0], &[]) >= quality_score(&pair[1], &[]));
        }
    }
}
