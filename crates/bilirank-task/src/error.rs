use bilirank_analysis::AnalysisError;
use bilirank_bilibili::BilibiliError;
use bilirank_core::{ConfigError, CoreError};
use thiserror::Error;

use crate::store::StoreError;

/// Fatal task errors. Each one moves the task to `failed` with its message
/// persisted.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    InvalidRequest(CoreError),

    #[error("no videos found for the given keywords")]
    NoVideos,

    #[error("no usable comments were collected")]
    NoComments,

    #[error("analysis failed for all {count} comments")]
    AllAnalysisFailed { count: usize },

    #[error("task cancelled")]
    Cancelled,

    #[error("platform error: {0}")]
    Bilibili(#[from] BilibiliError),

    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
