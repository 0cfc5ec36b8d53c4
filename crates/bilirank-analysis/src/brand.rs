//! Brand and model string cleanup.

use std::path::Path;
use std::sync::LazyLock;

use bilirank_core::{GENERIC_MODEL, UNKNOWN};
use regex::Regex;
use serde::Deserialize;

use crate::error::AnalysisError;

/// Model names that describe a variant rather than name one.
const DESCRIPTIVE_MODELS: [&str; 5] = ["新款", "旧款", "基础款", "升级款", "标准版"];

/// Ordered fallback patterns for pulling a model name out of free text. The
/// `m` group is the model; ASCII boundaries are spelled out so CJK text next
/// to a model still counts as a boundary.
static MODEL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?P<m>(?:iPhone|Galaxy|Pixel|Mate|Mi|Redmi|V|G|X|S)\s*\d+\s*(?:Pro|Max|Plus|Ultra|Detect|Slim)(?:\s+(?:Pro|Max|Plus|Ultra))?)",
        r"(?i)(?:^|[^a-z0-9_])(?P<m>Pura\s+(?:X|Max)|T[1-4]S?|SCOOPER(?:\s+SE)?|Young|M1(?:\s+Pro)?|T\s+Air)(?:$|[^a-z0-9_])",
        r"(?i)(?P<m>[a-z]+\d+\s*(?:Pro|Max|Plus|Ultra|Detect|Slim))",
        r"(?i)(?:^|[^a-z0-9_])(?P<m>[a-z]+\d+)(?:$|[^a-z0-9_])",
        r"(?i)\s(?P<m>Pro|Max|Plus|Ultra)\s",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Pluggable alias table mapping spellings to a canonical brand name.
///
/// Lookup is exact and case-insensitive against each alias and the canonical
/// name itself; entries are tried in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandAliases {
    entries: Vec<(String, Vec<String>)>,
}

#[derive(Deserialize)]
struct AliasEntry {
    brand: String,
    #[serde(default)]
    aliases: Vec<String>,
}

impl Default for BrandAliases {
    fn default() -> Self {
        let table: [(&str, &[&str]); 8] = [
            ("苹果", &["apple", "iphone", "ipad", "mac", "airpods"]),
            ("戴森", &["dyson"]),
            ("小米", &["xiaomi", "mi", "redmi"]),
            ("华为", &["huawei", "honor", "荣耀"]),
            ("三星", &["samsung", "galaxy"]),
            ("索尼", &["sony", "playstation", "ps5"]),
            ("小佩", &["petkit"]),
            ("CATLINK", &["catlink", "猫猫狗狗"]),
        ];
        Self::new(
            table
                .iter()
                .map(|(brand, aliases)| {
                    (
                        (*brand).to_string(),
                        aliases.iter().map(|a| (*a).to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl BrandAliases {
    #[must_use]
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        Self { entries }
    }

    /// An empty table: every brand maps to itself.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Loads a table from a YAML list of `{brand, aliases}` entries.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Aliases`] if the file cannot be read or parsed.
    pub fn from_yaml_file(path: &Path) -> Result<Self, AnalysisError> {
        let alias_err = |reason: String| AnalysisError::Aliases {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| alias_err(e.to_string()))?;
        Self::from_yaml_str(&raw).map_err(|e| alias_err(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns the YAML error if `raw` is not a list of `{brand, aliases}`.
    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        let parsed: Vec<AliasEntry> = serde_yaml::from_str(raw)?;
        Ok(Self::new(
            parsed
                .into_iter()
                .map(|e| (e.brand, e.aliases))
                .collect(),
        ))
    }

    /// Canonical name for `brand`, or `brand` trimmed when no entry matches.
    #[must_use]
    pub fn normalize(&self, brand: &str) -> String {
        let trimmed = brand.trim();
        let lowered = trimmed.to_lowercase();
        if lowered.is_empty() {
            return String::new();
        }
        self.entries
            .iter()
            .find(|(canonical, aliases)| {
                canonical.to_lowercase() == lowered
                    || aliases.iter().any(|a| a.to_lowercase() == lowered)
            })
            .map_or_else(|| trimmed.to_string(), |(canonical, _)| canonical.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Upper-cases a brand made only of ASCII letters (`oppo` -> `OPPO`).
#[must_use]
pub fn format_brand_name(brand: &str) -> String {
    let trimmed = brand.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        trimmed.to_ascii_uppercase()
    } else {
        trimmed.to_string()
    }
}

/// Resolves a `/`-joined brand to a single name.
///
/// The first segment that matches a `known` brand (case-insensitively) wins,
/// returned in its known spelling; otherwise the first segment.
#[must_use]
pub fn clean_brand_name(brand: &str, known: &[String]) -> String {
    let trimmed = brand.trim();
    if trimmed.is_empty() || trimmed == UNKNOWN || !trimmed.contains('/') {
        return trimmed.to_string();
    }

    let segments: Vec<&str> = trimmed.split('/').map(str::trim).collect();
    for segment in &segments {
        if let Some(k) = known.iter().find(|k| k.to_lowercase() == segment.to_lowercase()) {
            return k.clone();
        }
    }
    segments.first().map_or_else(String::new, |s| (*s).to_string())
}

/// Keeps the first `/` segment and maps descriptive names to the generic
/// model token.
#[must_use]
pub fn clean_model_name(model: &str) -> String {
    let first = model.split('/').next().unwrap_or_default().trim();
    if DESCRIPTIVE_MODELS.contains(&first) {
        GENERIC_MODEL.to_string()
    } else {
        first.to_string()
    }
}

/// First model-looking token in `content`, or an empty string.
#[must_use]
pub fn extract_model_from_content(content: &str) -> String {
    MODEL_PATTERNS
        .iter()
        .find_map(|re| re.captures(content))
        .and_then(|caps| caps.name("m"))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(brands: &[&str]) -> Vec<String> {
        brands.iter().map(|b| (*b).to_string()).collect()
    }

    #[test]
    fn default_aliases_normalize_exact_spellings() {
        let aliases = BrandAliases::default();
        assert_eq!(aliases.normalize("Apple"), "苹果");
        assert_eq!(aliases.normalize(" DYSON "), "戴森");
        assert_eq!(aliases.normalize("荣耀"), "华为");
        assert_eq!(aliases.normalize("catlink"), "CATLINK");
        assert_eq!(aliases.normalize("小米"), "小米");
    }

    #[test]
    fn alias_lookup_does_not_match_substrings() {
        let aliases = BrandAliases::default();
        assert_eq!(aliases.normalize("Midea"), "Midea");
        assert_eq!(aliases.normalize("追觅"), "追觅");
    }

    #[test]
    fn aliases_load_from_yaml() {
        let aliases = BrandAliases::from_yaml_str(
            "- brand: 追觅\n  aliases: [dreame]\n- brand: 石头\n  aliases: [roborock]\n",
        )
        .unwrap();
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases.normalize("Roborock"), "石头");
        assert_eq!(aliases.normalize("apple"), "apple");
    }

    #[test]
    fn missing_alias_file_is_reported() {
        let err = BrandAliases::from_yaml_file(Path::new("/nonexistent/aliases.yaml")).unwrap_err();
        assert!(matches!(err, AnalysisError::Aliases { .. }), "expected Aliases, got: {err:?}");
    }

    #[test]
    fn formats_pure_ascii_brands_upper_case() {
        assert_eq!(format_brand_name("oppo"), "OPPO");
        assert_eq!(format_brand_name("CatLink"), "CATLINK");
        assert_eq!(format_brand_name("小米"), "小米");
        assert_eq!(format_brand_name("K9 Pro"), "K9 Pro");
    }

    #[test]
    fn clean_brand_prefers_known_segment() {
        let declared = known(&["小佩", "CATLINK"]);
        assert_eq!(clean_brand_name("霍曼/catlink", &declared), "CATLINK");
        assert_eq!(clean_brand_name("霍曼/美的", &declared), "霍曼");
        assert_eq!(clean_brand_name("小米", &declared), "小米");
        assert_eq!(clean_brand_name("未知", &declared), "未知");
    }

    #[test]
    fn clean_model_maps_descriptive_words() {
        assert_eq!(clean_model_name("新款"), "通用");
        assert_eq!(clean_model_name("V12/V15"), "V12");
        assert_eq!(clean_model_name(" G10 "), "G10");
    }

    #[test]
    fn extracts_models_from_text() {
        assert_eq!(extract_model_from_content("我买的是 iPhone 15 Pro Max 真香"), "iPhone 15 Pro Max");
        assert_eq!(extract_model_from_content("V12吸力很强续航也不错"), "V12");
        assert_eq!(extract_model_from_content("小米 G10 一般般"), "G10");
        assert_eq!(extract_model_from_content("入手了 T4S 还行"), "T4S");
        assert_eq!(extract_model_from_content("没有型号的评论"), "");
    }
}
