use crate::app_config::{AppConfig, Environment};
use crate::task::TaskLimits;
use crate::ConfigError;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Credentials (AI key, cookie, database URL) are optional here; the commands
/// that need them report a [`ConfigError::MissingEnvVar`] at the point of use.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = parse_usize(var, default)?;
        if value == 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(value)
    };

    let database_url = optional("DATABASE_URL");
    let env = parse_environment(&or_default("BILIRANK_ENV", "development"));
    let log_level = or_default("BILIRANK_LOG_LEVEL", "info");
    let brand_aliases_path = optional("BILIRANK_BRAND_ALIASES_PATH").map(PathBuf::from);

    let db_max_connections = parse_u32("BILIRANK_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("BILIRANK_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("BILIRANK_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let ai_api_key = optional("BILIRANK_AI_API_KEY");
    let ai_api_base = or_default("BILIRANK_AI_API_BASE", "https://api.openai.com/v1")
        .trim_end_matches('/')
        .to_string();
    let ai_model = or_default("BILIRANK_AI_MODEL", "gpt-4o-mini");
    let ai_max_concurrent = positive_usize("BILIRANK_AI_MAX_CONCURRENT", "10")?;
    let ai_timeout_secs = parse_u64("BILIRANK_AI_TIMEOUT_SECS", "60")?;

    let bilibili_cookie = optional("BILIBILI_COOKIE");
    let http_timeout_secs = parse_u64("BILIRANK_HTTP_TIMEOUT_SECS", "20")?;
    let user_agent = or_default("BILIRANK_USER_AGENT", DEFAULT_USER_AGENT);
    let http_max_retries = parse_u32("BILIRANK_HTTP_MAX_RETRIES", "2")?;
    let http_retry_backoff_ms = parse_u64("BILIRANK_HTTP_RETRY_BACKOFF_MS", "500")?;

    let defaults = TaskLimits::default();
    let task_limits = TaskLimits {
        max_videos_per_keyword: positive_usize(
            "BILIRANK_MAX_VIDEOS_PER_KEYWORD",
            &defaults.max_videos_per_keyword.to_string(),
        )?,
        max_comments: positive_usize(
            "BILIRANK_MAX_COMMENTS",
            &defaults.max_comments.to_string(),
        )?,
        min_comments_per_video: parse_usize(
            "BILIRANK_MIN_COMMENTS_PER_VIDEO",
            &defaults.min_comments_per_video.to_string(),
        )?,
        max_comments_per_video: positive_usize(
            "BILIRANK_MAX_COMMENTS_PER_VIDEO",
            &defaults.max_comments_per_video.to_string(),
        )?,
        max_concurrency: positive_usize(
            "BILIRANK_MAX_CONCURRENCY",
            &defaults.max_concurrency.to_string(),
        )?,
        ai_batch_concurrency: positive_usize(
            "BILIRANK_AI_BATCH_CONCURRENCY",
            &defaults.ai_batch_concurrency.to_string(),
        )?,
        request_delay_ms: parse_u64(
            "BILIRANK_REQUEST_DELAY_MS",
            &defaults.request_delay_ms.to_string(),
        )?,
        min_video_duration_secs: parse_u32(
            "BILIRANK_MIN_VIDEO_DURATION_SECS",
            &defaults.min_video_duration_secs.to_string(),
        )?,
        video_date_range_months: parse_u32(
            "BILIRANK_VIDEO_DATE_RANGE_MONTHS",
            &defaults.video_date_range_months.to_string(),
        )?,
        min_video_comments: parse_u64(
            "BILIRANK_MIN_VIDEO_COMMENTS",
            &defaults.min_video_comments.to_string(),
        )?,
    };

    if task_limits.min_comments_per_video > task_limits.max_comments_per_video {
        return Err(ConfigError::InvalidEnvVar {
            var: "BILIRANK_MIN_COMMENTS_PER_VIDEO".to_string(),
            reason: format!(
                "floor {} exceeds ceiling {}",
                task_limits.min_comments_per_video, task_limits.max_comments_per_video
            ),
        });
    }

    let task_stale_secs = parse_u64("BILIRANK_TASK_STALE_SECS", "3600")?;
    let raw_comment_retention_days = parse_u32("BILIRANK_RAW_COMMENT_RETENTION_DAYS", "3")?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        brand_aliases_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        ai_api_key,
        ai_api_base,
        ai_model,
        ai_max_concurrent,
        ai_timeout_secs,
        bilibili_cookie,
        http_timeout_secs,
        user_agent,
        http_max_retries,
        http_retry_backoff_ms,
        task_limits,
        task_stale_secs,
        raw_comment_retention_days,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

impl AppConfig {
    /// The database URL, or a config error naming the missing variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when `DATABASE_URL` is unset.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }
}
