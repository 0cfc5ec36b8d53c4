//! Aggregation and ranking of scored comments into a report.
//!
//! Everything here is a pure function of its input: the same scored comments
//! always produce the same rankings, rounded scores and ordering.

pub mod generator;
pub mod ranking;
pub mod stats;
pub mod types;

pub use generator::{generate_report, template_recommendation};
pub use ranking::{
    brand_analysis, brand_scores, generate_model_rankings, generate_rankings, normalize_model_key,
};
pub use stats::{calculate_sentiment, extract_keywords, select_typical_comments};
pub use types::{
    KeywordItem, ReportData, ReportInput, ReportStats, SentimentStats, TypicalComment, VideoSource,
};

/// Rounds to one decimal place, half away from zero.
#[must_use]
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
