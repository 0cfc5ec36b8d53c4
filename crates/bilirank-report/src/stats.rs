//! Comment-level statistics: sentiment bands, typical comments, keywords.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use bilirank_core::ScoredComment;

use crate::round1;
use crate::types::{KeywordItem, SentimentStats, TypicalComment};

const POSITIVE_THRESHOLD: f64 = 8.0;
const NEUTRAL_THRESHOLD: f64 = 5.0;
const TYPICAL_PER_BRAND: usize = 3;
const TOP_KEYWORDS: usize = 50;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "的", "了", "是", "等", "也", "就", "都", "还", "很", "我", "你", "他", "她", "它", "我们",
        "你们", "他们", "这", "那", "这个", "那个", "一个", "一些", "不是", "没有", "在", "和", "与",
        "及", "而", "且", "或", "或者", "因为", "所以", "如果", "但是", "而且", "以及", "啊", "呢",
        "吗", "吧", "哦", "呀", "哈",
    ]
    .into_iter()
    .collect()
});

/// Average over non-null scores; comments without one are `None`.
fn valid_average(comment: &ScoredComment) -> Option<f64> {
    comment.average_score().filter(|avg| *avg > 0.0)
}

#[allow(clippy::cast_precision_loss)]
fn percent(count: usize, total: usize) -> f64 {
    round1(count as f64 / total as f64 * 100.0)
}

/// Counts comments by average score: positive at 8 or more, neutral at 5 or
/// more, negative below. Comments with no valid average are left out of the
/// counts and the denominator.
#[must_use]
pub fn calculate_sentiment(results: &BTreeMap<String, Vec<ScoredComment>>) -> SentimentStats {
    let mut stats = SentimentStats::default();
    for avg in results.values().flatten().filter_map(valid_average) {
        if avg >= POSITIVE_THRESHOLD {
            stats.positive_count += 1;
        } else if avg >= NEUTRAL_THRESHOLD {
            stats.neutral_count += 1;
        } else {
            stats.negative_count += 1;
        }
    }

    let total = stats.positive_count + stats.neutral_count + stats.negative_count;
    if total > 0 {
        stats.positive_pct = percent(stats.positive_count, total);
        stats.neutral_pct = percent(stats.neutral_count, total);
        stats.negative_pct = percent(stats.negative_count, total);
    }
    stats
}

/// Per brand, the three best comments averaging 8 or more (best first) and
/// the three worst averaging under 5 (worst first). Equal scores order by
/// content.
#[must_use]
pub fn select_typical_comments(
    results: &BTreeMap<String, Vec<ScoredComment>>,
) -> (
    BTreeMap<String, Vec<TypicalComment>>,
    BTreeMap<String, Vec<TypicalComment>>,
) {
    let mut top = BTreeMap::new();
    let mut bad = BTreeMap::new();

    for (brand, comments) in results {
        let mut good_list = Vec::new();
        let mut bad_list = Vec::new();
        for comment in comments.iter().filter(|c| !c.content.is_empty()) {
            let Some(score) = valid_average(comment) else {
                continue;
            };
            let typical = TypicalComment {
                content: comment.content.clone(),
                score,
            };
            if score >= POSITIVE_THRESHOLD {
                good_list.push(typical);
            } else if score < NEUTRAL_THRESHOLD {
                bad_list.push(typical);
            }
        }

        good_list.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.content.cmp(&b.content))
        });
        bad_list.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then_with(|| a.content.cmp(&b.content))
        });
        good_list.truncate(TYPICAL_PER_BRAND);
        bad_list.truncate(TYPICAL_PER_BRAND);

        top.insert(brand.clone(), good_list);
        bad.insert(brand.clone(), bad_list);
    }
    (top, bad)
}

/// Splits on anything that is not a letter or digit.
fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
}

/// The 50 most frequent words across all comment text, most frequent first,
/// ties alphabetical. Words are lower-cased; single characters and stop words
/// are dropped.
#[must_use]
pub fn extract_keywords(results: &BTreeMap<String, Vec<ScoredComment>>) -> Vec<KeywordItem> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for comment in results.values().flatten() {
        for token in tokenize(comment.content.trim()) {
            let word = token.to_lowercase();
            if word.chars().count() <= 1 || STOP_WORDS.contains(word.as_str()) {
                continue;
            }
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut items: Vec<KeywordItem> = counts
        .into_iter()
        .map(|(word, count)| KeywordItem { word, count })
        .collect();
    items.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
    items.truncate(TOP_KEYWORDS);
    items
}
