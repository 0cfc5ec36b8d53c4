use std::collections::BTreeMap;
use std::fmt::Write as _;

use bilirank_core::{BrandAnalysis, BrandRanking, ModelRanking};

use crate::client::{ChatMessage, ChatModel};
use crate::error::AnalysisError;
use crate::prompt;

/// Returned without a model call when there is nothing to rank.
pub const NO_DATA_RECOMMENDATION: &str = "暂无足够数据生成购买建议";

fn bracket_list(items: &[String]) -> String {
    format!("[{}]", items.join(" "))
}

fn recommendation_prompt(
    category: &str,
    rankings: &[BrandRanking],
    analysis: &BTreeMap<String, BrandAnalysis>,
    model_rankings: &[ModelRanking],
) -> String {
    let mut ranking_text = String::new();
    for r in rankings {
        let _ = write!(ranking_text, "第{}名：{}（{:.1}分）", r.rank, r.brand, r.overall_score);
        if let Some(a) = analysis.get(&r.brand) {
            if !a.strengths.is_empty() {
                let _ = write!(ranking_text, "，优势：{}", bracket_list(&a.strengths));
            }
            if !a.weaknesses.is_empty() {
                let _ = write!(ranking_text, "，劣势：{}", bracket_list(&a.weaknesses));
            }
        }
        ranking_text.push('\n');
    }

    let mut model_text = String::new();
    if !model_rankings.is_empty() {
        model_text.push_str("\n\n型号排名：\n");
        for m in model_rankings {
            let _ = writeln!(
                model_text,
                "第{}名：{} {}（{:.1}分，{}条评论）",
                m.rank, m.brand, m.model, m.overall_score, m.comment_count
            );
        }
    }

    format!("商品类别：{category}\n\n品牌排名及分析：\n{ranking_text}{model_text}\n请生成购买建议：")
}

/// Asks the model for markdown purchase advice based on the rankings.
///
/// # Errors
///
/// Returns the model call's error; callers keep their template text.
pub async fn generate_recommendation(
    model: &dyn ChatModel,
    category: &str,
    rankings: &[BrandRanking],
    analysis: &BTreeMap<String, BrandAnalysis>,
    model_rankings: &[ModelRanking],
) -> Result<String, AnalysisError> {
    if rankings.is_empty() {
        return Ok(NO_DATA_RECOMMENDATION.to_string());
    }
    let messages = [
        ChatMessage::system(prompt::RECOMMENDATION_SYSTEM),
        ChatMessage::user(recommendation_prompt(category, rankings, analysis, model_rankings)),
    ];
    let reply = model.complete(&messages).await?;
    Ok(reply.trim().to_string())
}
