pub mod app_config;
pub mod cancel;
pub mod config;
pub mod task;
pub mod types;

pub use app_config::{AppConfig, Environment};
pub use cancel::cancellable;
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use task::{ProgressEvent, TaskLimits, TaskRecord, TaskRequest, TaskStage};
pub use types::{
    BrandAnalysis, BrandRanking, CommentInput, Dimension, ModelRanking, RawComment, ScoredComment,
    VideoItem,
};

use thiserror::Error;

/// Placeholder the model returns when it cannot name a brand or model.
pub const UNKNOWN: &str = "未知";

/// Canonical model token for comments that do not name a concrete model.
pub const GENERIC_MODEL: &str = "通用";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid task stage: {0}")]
    InvalidStage(String),

    #[error("illegal stage transition {from} -> {to}")]
    IllegalTransition { from: TaskStage, to: TaskStage },

    #[error("invalid task request: {0}")]
    InvalidRequest(String),
}
