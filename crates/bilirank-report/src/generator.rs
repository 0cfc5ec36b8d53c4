use bilirank_core::{BrandRanking, Dimension};

use crate::ranking::{brand_analysis, brand_scores, generate_model_rankings, generate_rankings};
use crate::stats::{calculate_sentiment, extract_keywords, select_typical_comments};
use crate::types::{ReportData, ReportInput, ReportStats, VideoSource};

const NO_DATA: &str = "暂无足够数据生成购买建议";
const STRENGTH_THRESHOLD: f64 = 8.0;

/// Rule-based purchase advice naming the top brand, its strong dimensions,
/// and the runner-up.
#[must_use]
pub fn template_recommendation(rankings: &[BrandRanking], dimensions: &[Dimension]) -> String {
    let Some(top) = rankings.first() else {
        return NO_DATA.to_string();
    };

    let strengths: Vec<&str> = dimensions
        .iter()
        .filter(|d| top.scores.get(&d.name).is_some_and(|s| *s >= STRENGTH_THRESHOLD))
        .map(|d| d.name.as_str())
        .collect();

    let mut text = format!(
        "综合评价最高的是 {}（综合得分：{:.1}分）",
        top.brand, top.overall_score
    );
    if !strengths.is_empty() {
        text.push_str(&format!("，在 [{}] 方面表现突出", strengths.join(" ")));
    }
    if let Some(second) = rankings.get(1) {
        text.push_str(&format!(
            "。{}（{:.1}分）紧随其后",
            second.brand, second.overall_score
        ));
    }
    text.push_str("。建议根据个人需求和预算选择合适的产品。");
    text
}

/// Builds the full report from scored comments grouped by brand.
///
/// The recommendation is the template text; callers may replace it with
/// model-written advice.
#[must_use]
pub fn generate_report(input: &ReportInput) -> ReportData {
    let scores = brand_scores(&input.results);
    let rankings = generate_rankings(&input.dimensions, &scores, &input.results);
    let analysis = brand_analysis(&input.dimensions, &scores);
    let model_rankings = generate_model_rankings(&input.results);
    let (top_comments, bad_comments) = select_typical_comments(&input.results);
    let sentiment_distribution = calculate_sentiment(&input.results);
    let keyword_frequency = extract_keywords(&input.results);

    let stats = ReportStats {
        total_videos: input.videos.len(),
        total_comments: input.total_comments,
        comments_by_brand: input
            .results
            .iter()
            .map(|(brand, comments)| (brand.clone(), comments.len()))
            .collect(),
    };

    tracing::debug!(
        brands = rankings.len(),
        models = model_rankings.len(),
        keywords = keyword_frequency.len(),
        videos = input.videos.len(),
        "report aggregated"
    );

    ReportData {
        category: input.category.clone(),
        brands: rankings.iter().map(|r| r.brand.clone()).collect(),
        dimensions: input.dimensions.clone(),
        recommendation: template_recommendation(&rankings, &input.dimensions),
        scores,
        rankings,
        stats,
        sentiment_distribution,
        top_comments,
        bad_comments,
        brand_analysis: analysis,
        model_rankings,
        video_sources: input.videos.iter().map(VideoSource::from).collect(),
        keyword_frequency,
    }
}
