//! Comment analysis for bilirank.
//!
//! Filters and ranks raw comments, packs them into size-bounded batches, scores
//! each batch with one chat-completion call (falling back to per-comment calls
//! when the merged reply is unusable), then discovers, cleans and classifies
//! brands and models.

pub mod batch;
pub mod brand;
pub mod client;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod json;
pub mod pipeline;
pub mod recommendation;

mod prompt;

pub use batch::{calculate_batches, BatchConfig};
pub use brand::{
    clean_brand_name, clean_model_name, extract_model_from_content, format_brand_name,
    BrandAliases,
};
pub use client::{ChatMessage, ChatModel, LlmClient, LlmOptions};
pub use discovery::{
    classify_results, collect_discovered_brands, collect_unknown_models,
    identify_brands_for_models, normalize_results, BrandIdentifyContext,
};
pub use error::AnalysisError;
pub use filter::{filter_and_rank, quality_score, FilterConfig};
pub use json::clean_json_response;
pub use pipeline::{
    analyze_batch_merged, analyze_comment, analyze_comments, analyze_comments_individually,
    AnalysisProgress,
};
pub use recommendation::{generate_recommendation, NO_DATA_RECOMMENDATION};
