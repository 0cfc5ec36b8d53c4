//! OpenAI-compatible chat-completions client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bilirank_core::{AppConfig, ConfigError};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::AnalysisError;

/// Attempts per call: the first request plus one retry.
const MAX_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Bytes of an error body kept in [`AnalysisError::UnexpectedStatus`].
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Anything that can answer a chat prompt with the text of one reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// # Errors
    ///
    /// Implementation-defined; see [`LlmClient`] for the HTTP client's errors.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /// Ceiling on simultaneous requests through one client.
    pub max_concurrent: usize,
    pub timeout_secs: u64,
    pub retry_delay: Duration,
}

impl LlmOptions {
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when no API key is configured.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .ai_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("BILIRANK_AI_API_KEY".to_string()))?;
        Ok(Self {
            api_base: config.ai_api_base.clone(),
            api_key,
            model: config.ai_model.clone(),
            max_concurrent: config.ai_max_concurrent,
            timeout_secs: config.ai_timeout_secs,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// Chat-completions client with a global concurrency gate.
///
/// Every call holds one permit for its whole duration, retries included, so
/// at most `max_concurrent` requests are in flight no matter how many
/// batches or comments are being processed.
pub struct LlmClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    permits: Arc<Semaphore>,
    retry_delay: Duration,
}

impl LlmClient {
    /// # Errors
    ///
    /// Returns [`AnalysisError::Http`] if the HTTP client cannot be built.
    pub fn new(options: LlmOptions) -> Result<Self, AnalysisError> {
        let base = options.api_base.clone();
        Self::with_base_url(options, &base)
    }

    /// Like [`LlmClient::new`] but targets `base_url` instead of
    /// `options.api_base`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Http`] if the HTTP client cannot be built.
    pub fn with_base_url(options: LlmOptions, base_url: &str) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: options.api_key,
            model: options.model,
            permits: Arc::new(Semaphore::new(options.max_concurrent.max(1))),
            retry_delay: options.retry_delay,
        })
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> Result<String, AnalysisError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(AnalysisError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|source| AnalysisError::Deserialize {
                context: "chat completion".to_string(),
                source,
            })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AnalysisError::EmptyChoices)
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    /// Sends `messages` and returns the first choice's content.
    ///
    /// A failed attempt is retried once after a fixed delay.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::UnexpectedStatus`] for a non-2xx reply.
    /// - [`AnalysisError::Deserialize`] for an undecodable body.
    /// - [`AnalysisError::EmptyChoices`] when the reply has no choices.
    /// - [`AnalysisError::Http`] for transport failures and timeouts.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AnalysisError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AnalysisError::Cancelled)?;

        let mut attempt = 1;
        loop {
            match self.send_once(messages).await {
                Ok(content) => return Ok(content),
                Err(err) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        attempt,
                        delay_ms = u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
