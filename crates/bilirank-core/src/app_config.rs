use std::path::PathBuf;

use crate::task::TaskLimits;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub env: Environment,
    pub log_level: String,
    pub brand_aliases_path: Option<PathBuf>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub ai_api_key: Option<String>,
    pub ai_api_base: String,
    pub ai_model: String,
    pub ai_max_concurrent: usize,
    pub ai_timeout_secs: u64,
    pub bilibili_cookie: Option<String>,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub http_max_retries: u32,
    pub http_retry_backoff_ms: u64,
    /// Default limits applied to tasks submitted without explicit overrides.
    pub task_limits: TaskLimits,
    pub task_stale_secs: u64,
    pub raw_comment_retention_days: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("brand_aliases_path", &self.brand_aliases_path)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("ai_api_key", &self.ai_api_key.as_ref().map(|_| "[redacted]"))
            .field("ai_api_base", &self.ai_api_base)
            .field("ai_model", &self.ai_model)
            .field("ai_max_concurrent", &self.ai_max_concurrent)
            .field("ai_timeout_secs", &self.ai_timeout_secs)
            .field(
                "bilibili_cookie",
                &self.bilibili_cookie.as_ref().map(|_| "[redacted]"),
            )
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("http_max_retries", &self.http_max_retries)
            .field("http_retry_backoff_ms", &self.http_retry_backoff_ms)
            .field("task_limits", &self.task_limits)
            .field("task_stale_secs", &self.task_stale_secs)
            .field(
                "raw_comment_retention_days",
                &self.raw_comment_retention_days,
            )
            .finish()
    }
}
