//! Brand discovery, normalization and classification of scored comments.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use bilirank_core::{ScoredComment, GENERIC_MODEL, UNKNOWN};
use serde::Deserialize;

use crate::brand::{
    clean_brand_name, clean_model_name, extract_model_from_content, format_brand_name,
    BrandAliases,
};
use crate::client::{ChatMessage, ChatModel};
use crate::error::AnalysisError;
use crate::prompt;

/// Context for asking the model which brand a bare model name belongs to.
#[derive(Debug, Clone, Default)]
pub struct BrandIdentifyContext {
    pub category: String,
    /// Brands the user asked about.
    pub known_brands: Vec<String>,
    /// Brands already seen in this run's results.
    pub discovered_brands: Vec<String>,
}

#[derive(Deserialize)]
struct BrandIdentifyResponse {
    #[serde(default)]
    results: BTreeMap<String, String>,
}

fn is_unknown(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == UNKNOWN
}

/// Models of successfully scored comments that name a concrete model but no
/// brand, in first-seen order.
#[must_use]
pub fn collect_unknown_models(results: &[ScoredComment]) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.is_scored() && is_unknown(&r.brand))
        .map(|r| r.model.trim())
        .filter(|m| !is_unknown(m) && *m != GENERIC_MODEL)
        .map(str::to_string)
        .collect()
}

/// Distinct brands of successfully scored comments, sorted.
#[must_use]
pub fn collect_discovered_brands(results: &[ScoredComment]) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.is_scored() && !is_unknown(&r.brand))
        .map(|r| r.brand.trim().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Asks the model for the brand of each of `models` in one request.
///
/// Models are deduplicated case-insensitively. A reply that cannot be parsed
/// yields an empty map rather than an error.
///
/// # Errors
///
/// Returns the model call's error.
pub async fn identify_brands_for_models(
    model: &dyn ChatModel,
    models: &[String],
    ctx: &BrandIdentifyContext,
) -> Result<BTreeMap<String, String>, AnalysisError> {
    let mut seen = HashSet::new();
    let unique: Vec<String> = models
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty() && seen.insert(m.to_lowercase()))
        .map(str::to_string)
        .collect();
    if unique.is_empty() {
        return Ok(BTreeMap::new());
    }

    tracing::info!(
        models = unique.len(),
        category = %ctx.category,
        "identifying brands for unattributed models"
    );
    let messages = [
        ChatMessage::system(prompt::brand_identify_system(
            &ctx.category,
            &ctx.known_brands,
            &ctx.discovered_brands,
        )),
        ChatMessage::user(prompt::brand_identify_user(&unique)),
    ];
    let reply = model.complete(&messages).await?;

    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if end > start => &reply[start..=end],
        _ => reply.as_str(),
    };
    match serde_json::from_str::<BrandIdentifyResponse>(json) {
        Ok(parsed) => Ok(parsed.results),
        Err(e) => {
            tracing::warn!(error = %e, "brand identification reply did not parse");
            Ok(BTreeMap::new())
        }
    }
}

fn lookup_identified<'a>(identified: &'a BTreeMap<String, String>, model: &str) -> Option<&'a str> {
    identified
        .get(model)
        .or_else(|| {
            let lowered = model.to_lowercase();
            identified
                .iter()
                .find(|(k, _)| k.to_lowercase() == lowered)
                .map(|(_, v)| v)
        })
        .map(String::as_str)
        .filter(|b| !is_unknown(b))
}

/// Cleans brand and model strings in place.
///
/// For each result: fill an unknown brand from `identified` (keyed by model),
/// map it through `aliases`, resolve `/`-joined brands against
/// `known_brands`, upper-case pure-ASCII brands, then clean the model name.
/// The segment kept from a `/`-joined brand is mapped through `aliases` too.
pub fn normalize_results(
    results: &mut [ScoredComment],
    identified: &BTreeMap<String, String>,
    known_brands: &[String],
    aliases: &BrandAliases,
) {
    for result in results.iter_mut() {
        let model = result.model.trim().to_string();
        if is_unknown(&result.brand) && !model.is_empty() {
            if let Some(brand) = lookup_identified(identified, &model) {
                result.brand = brand.to_string();
            }
        }
        if !result.brand.trim().is_empty() {
            let cleaned = clean_brand_name(&aliases.normalize(&result.brand), known_brands);
            result.brand = format_brand_name(&aliases.normalize(&cleaned));
        }
        result.model = clean_model_name(&result.model);
    }
}

fn match_declared<'a>(brand: &str, declared: &'a [String]) -> Option<&'a String> {
    let lowered = brand.to_lowercase();
    declared.iter().find(|d| {
        let d = d.to_lowercase();
        !d.is_empty() && (lowered.contains(&d) || d.contains(&lowered))
    })
}

/// Groups successfully scored comments by brand.
///
/// A comment whose brand overlaps a declared brand is filed under the
/// declared spelling; any other brand is kept as discovered. A comment with
/// no brand is filed under the first declared brand its content mentions,
/// and dropped when there is none. Missing models fall back to a pattern
/// match on the content.
#[must_use]
pub fn classify_results(
    results: &[ScoredComment],
    declared: &[String],
    aliases: &BrandAliases,
) -> BTreeMap<String, Vec<ScoredComment>> {
    let mut grouped: BTreeMap<String, Vec<ScoredComment>> = BTreeMap::new();

    for result in results.iter().filter(|r| r.is_scored()) {
        let mut brand = aliases.normalize(&result.brand);
        if is_unknown(&brand) {
            let content = result.content.to_lowercase();
            brand = declared
                .iter()
                .find(|d| !d.trim().is_empty() && content.contains(&d.to_lowercase()))
                .cloned()
                .unwrap_or_default();
        }
        if is_unknown(&brand) {
            continue;
        }

        let key = match_declared(&brand, declared).cloned().unwrap_or(brand);
        let mut comment = result.clone();
        if is_unknown(&comment.model) {
            comment.model = extract_model_from_content(&comment.content);
        }
        comment.brand.clone_from(&key);
        grouped.entry(key).or_default().push(comment);
    }

    let discovered: Vec<&String> = grouped
        .keys()
        .filter(|k| !declared.contains(k))
        .collect();
    if !discovered.is_empty() {
        tracing::info!(brands = ?discovered, "discovered undeclared brands");
    }
    grouped
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct CannedModel {
        reply: String,
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl CannedModel {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AnalysisError> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            Ok(self.reply.clone())
        }
    }

    fn scored(content: &str, brand: &str, model: &str) -> ScoredComment {
        let mut c = ScoredComment {
            content: content.to_string(),
            brand: brand.to_string(),
            model: model.to_string(),
            ..ScoredComment::default()
        };
        c.scores.insert("吸力".to_string(), Some(8.0));
        c
    }

    fn declared(brands: &[&str]) -> Vec<String> {
        brands.iter().map(|b| (*b).to_string()).collect()
    }

    #[test]
    fn unknown_models_skip_generic_and_failed() {
        let mut failed = scored("x", "", "K9");
        failed.error = Some("boom".to_string());
        let results = vec![
            scored("a", "未知", "TWS5"),
            scored("b", "", "通用"),
            scored("c", "小米", "G10"),
            scored("d", "", "未知"),
            failed,
        ];
        assert_eq!(collect_unknown_models(&results), vec!["TWS5".to_string()]);
    }

    #[test]
    fn discovered_brands_are_sorted_and_distinct() {
        let results = vec![
            scored("a", "小米", ""),
            scored("b", "OPPO", ""),
            scored("c", "小米", ""),
            scored("d", "未知", ""),
        ];
        assert_eq!(collect_discovered_brands(&results), declared(&["OPPO", "小米"]));
    }

    #[tokio::test]
    async fn identify_dedupes_and_parses_results() {
        let model = CannedModel::new("识别结果：{\"results\": {\"TWS5\": \"OPPO\"}} 以上");
        let ctx = BrandIdentifyContext {
            category: "耳机".to_string(),
            ..BrandIdentifyContext::default()
        };
        let out = identify_brands_for_models(&model, &declared(&["TWS5", "tws5", " "]), &ctx)
            .await
            .unwrap();
        assert_eq!(out.get("TWS5").map(String::as_str), Some("OPPO"));

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0][1].content.contains("型号列表：\nTWS5\n\n"));
        assert!(prompts[0][0].content.contains("用户关注的品牌：无"));
    }

    #[tokio::test]
    async fn identify_returns_empty_map_on_garbage() {
        let model = CannedModel::new("抱歉，我无法识别");
        let out = identify_brands_for_models(
            &model,
            &declared(&["V12"]),
            &BrandIdentifyContext::default(),
        )
        .await
        .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn identify_skips_call_without_models() {
        let model = CannedModel::new("{}");
        let out = identify_brands_for_models(&model, &[], &BrandIdentifyContext::default())
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn split_brand_is_upper_cased_and_grouped_with_its_peer() {
        let mut results = vec![scored("a", "oppo/vivo", "Reno"), scored("b", "OPPO", "Find")];
        normalize_results(&mut results, &BTreeMap::new(), &[], &BrandAliases::empty());
        assert_eq!(results[0].brand, "OPPO");

        let grouped = classify_results(&results, &[], &BrandAliases::empty());
        assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["OPPO"]);
        assert_eq!(grouped["OPPO"].len(), 2);
    }

    #[test]
    fn normalize_applies_identified_then_cleans() {
        let mut results = vec![
            scored("a", "未知", "tws5"),
            scored("b", "oppo/小米", "新款"),
            scored("c", "apple", "iPhone 15/iPhone 14"),
        ];
        let identified: BTreeMap<String, String> =
            [("TWS5".to_string(), "oppo".to_string())].into_iter().collect();
        normalize_results(&mut results, &identified, &declared(&["小米"]), &BrandAliases::default());

        assert_eq!(results[0].brand, "OPPO");
        assert_eq!(results[1].brand, "小米");
        assert_eq!(results[1].model, "通用");
        assert_eq!(results[2].brand, "苹果");
        assert_eq!(results[2].model, "iPhone 15");
    }

    #[test]
    fn classify_files_under_declared_spelling() {
        let results = vec![
            scored("V12吸力很强续航也不错", "Dyson", "V12"),
            scored("小米 G10 一般般", "小米科技", ""),
        ];
        let grouped = classify_results(
            &results,
            &declared(&["戴森", "小米"]),
            &BrandAliases::default(),
        );
        assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["小米", "戴森"]);
        assert_eq!(grouped["小米"][0].model, "G10");
        assert_eq!(grouped["小米"][0].brand, "小米");
    }

    #[test]
    fn classify_finds_declared_brand_in_content() {
        let results = vec![scored("听说 catlink 的新款不错", "未知", "通用")];
        let grouped = classify_results(&results, &declared(&["CATLINK"]), &BrandAliases::empty());
        assert_eq!(grouped["CATLINK"].len(), 1);
    }

    #[test]
    fn classify_keeps_discovered_and_drops_unbranded() {
        let mut failed = scored("x", "小米", "G10");
        failed.error = Some("超时".to_string());
        let results = vec![
            scored("追觅的 X30 很安静", "追觅", "X30"),
            scored("不知道说的是谁", "未知", ""),
            failed,
        ];
        let grouped = classify_results(&results, &declared(&["小米"]), &BrandAliases::default());
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped["追觅"].len(), 1);
    }
}
