//! Brand and model scoring and ranking.

use std::collections::BTreeMap;

use bilirank_core::{
    BrandAnalysis, BrandRanking, Dimension, ModelRanking, ScoredComment, GENERIC_MODEL, UNKNOWN,
};

use crate::round1;

const STRENGTH_THRESHOLD: f64 = 8.0;
const WEAKNESS_THRESHOLD: f64 = 6.0;

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Brand -> dimension -> mean of the non-null scores, rounded to one decimal.
///
/// Dimensions with no observation for a brand are absent from its map.
#[must_use]
pub fn brand_scores(
    results: &BTreeMap<String, Vec<ScoredComment>>,
) -> BTreeMap<String, BTreeMap<String, f64>> {
    results
        .iter()
        .filter(|(brand, _)| !brand.trim().is_empty())
        .map(|(brand, comments)| {
            let mut observed: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
            for comment in comments {
                for (dim, score) in &comment.scores {
                    if let Some(score) = score {
                        observed.entry(dim.as_str()).or_default().push(*score);
                    }
                }
            }
            let per_dim = observed
                .into_iter()
                .filter_map(|(dim, values)| mean(&values).map(|m| (dim.to_string(), round1(m))))
                .collect();
            (brand.clone(), per_dim)
        })
        .collect()
}

/// Ranks every brand in `scores` by the mean of its declared-dimension scores.
///
/// Ties go to the lexicographically smaller brand. Ranks are 1-based and
/// contiguous. `comment_count` is the size of the brand's group in `results`.
#[must_use]
pub fn generate_rankings(
    dimensions: &[Dimension],
    scores: &BTreeMap<String, BTreeMap<String, f64>>,
    results: &BTreeMap<String, Vec<ScoredComment>>,
) -> Vec<BrandRanking> {
    let mut rankings: Vec<BrandRanking> = scores
        .iter()
        .map(|(brand, per_dim)| {
            let present: Vec<f64> = dimensions
                .iter()
                .filter_map(|d| per_dim.get(&d.name).copied())
                .collect();
            BrandRanking {
                brand: brand.clone(),
                overall_score: mean(&present).map_or(0.0, round1),
                rank: 0,
                scores: per_dim.clone(),
                comment_count: results.get(brand).map_or(0, Vec::len),
            }
        })
        .collect();

    rankings.sort_by(|a, b| {
        b.overall_score
            .total_cmp(&a.overall_score)
            .then_with(|| a.brand.cmp(&b.brand))
    });
    for (i, r) in rankings.iter_mut().enumerate() {
        r.rank = i + 1;
    }
    rankings
}

/// Strengths (score >= 8.0) and weaknesses (score < 6.0) per brand, listed in
/// dimension order.
#[must_use]
pub fn brand_analysis(
    dimensions: &[Dimension],
    scores: &BTreeMap<String, BTreeMap<String, f64>>,
) -> BTreeMap<String, BrandAnalysis> {
    scores
        .iter()
        .map(|(brand, per_dim)| {
            let mut analysis = BrandAnalysis::default();
            for dim in dimensions {
                match per_dim.get(&dim.name) {
                    Some(&s) if s >= STRENGTH_THRESHOLD => {
                        analysis.strengths.push(dim.name.clone());
                    }
                    Some(&s) if s < WEAKNESS_THRESHOLD => {
                        analysis.weaknesses.push(dim.name.clone());
                    }
                    _ => {}
                }
            }
            (brand.clone(), analysis)
        })
        .collect()
}

/// Spelling-insensitive key for a (brand, model) pair:
/// `("OPPO", "TWS 5")` and `("oppo", "tws-5")` both give `"oppo|tws5"`.
#[must_use]
pub fn normalize_model_key(brand: &str, model: &str) -> String {
    let model: String = model
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect();
    format!("{}|{model}", brand.trim().to_lowercase())
}

/// Picks the display spelling among merged variants: one containing a space,
/// else one starting with an upper-case ASCII letter, else the first seen.
fn display_model(variants: &[String]) -> String {
    variants
        .iter()
        .find(|v| v.contains(' '))
        .or_else(|| {
            variants
                .iter()
                .find(|v| v.chars().next().is_some_and(|c| c.is_ascii_uppercase()))
        })
        .or_else(|| variants.first())
        .cloned()
        .unwrap_or_default()
}

#[derive(Default)]
struct ModelAccumulator {
    brand: String,
    variants: Vec<String>,
    scores: BTreeMap<String, Vec<f64>>,
    comments: usize,
}

/// Ranks concrete (brand, model) pairs across all brands.
///
/// Comments with an empty, unknown or generic model, or no brand, are
/// skipped. Per-dimension means are rounded; the overall score is the
/// unrounded mean over the dimensions the model was scored on. Ties order by
/// brand, then model.
#[must_use]
pub fn generate_model_rankings(
    results: &BTreeMap<String, Vec<ScoredComment>>,
) -> Vec<ModelRanking> {
    let mut models: BTreeMap<String, ModelAccumulator> = BTreeMap::new();

    for (brand_key, comments) in results {
        for comment in comments {
            let model = comment.model.trim();
            if model.is_empty() || model == UNKNOWN || model == GENERIC_MODEL {
                continue;
            }
            let brand = match comment.brand.trim() {
                "" => brand_key.trim(),
                b => b,
            };
            if brand.is_empty() || brand == UNKNOWN {
                continue;
            }

            let acc = models.entry(normalize_model_key(brand, model)).or_default();
            if acc.brand.is_empty() {
                acc.brand = brand.to_string();
            }
            acc.variants.push(model.to_string());
            for (dim, score) in &comment.scores {
                if let Some(score) = score {
                    acc.scores.entry(dim.clone()).or_default().push(*score);
                }
            }
            acc.comments += 1;
        }
    }

    let mut rankings: Vec<ModelRanking> = models
        .into_values()
        .map(|acc| {
            let means: BTreeMap<String, f64> = acc
                .scores
                .into_iter()
                .filter_map(|(dim, values)| mean(&values).map(|m| (dim, m)))
                .collect();
            let overall = mean(&means.values().copied().collect::<Vec<_>>()).unwrap_or(0.0);
            ModelRanking {
                model: display_model(&acc.variants),
                brand: acc.brand,
                overall_score: overall,
                rank: 0,
                scores: means.into_iter().map(|(d, m)| (d, round1(m))).collect(),
                comment_count: acc.comments,
            }
        })
        .collect();

    rankings.sort_by(|a, b| {
        b.overall_score
            .total_cmp(&a.overall_score)
            .then_with(|| a.brand.cmp(&b.brand))
            .then_with(|| a.model.cmp(&b.model))
    });
    for (i, r) in rankings.iter_mut().enumerate() {
        r.rank = i + 1;
    }
    rankings
}
