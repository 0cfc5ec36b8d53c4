use std::sync::Arc;

use async_trait::async_trait;
use bilirank_analysis::{BrandAliases, LlmClient, LlmOptions};
use bilirank_bilibili::{BilibiliClient, ClientOptions};
use bilirank_core::{AppConfig, ConfigError, TaskRequest, TaskStage};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::executor::{Executor, TaskOutcome};
use crate::platform::Platform;
use crate::progress::ProgressReporter;
use crate::store::TaskStore;

/// Something that can take a request to a finished report.
///
/// The manager and recovery drive tasks through this seam; failure handling
/// stays with them.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(
        &self,
        request: &TaskRequest,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<TaskOutcome, TaskError>;
}

#[async_trait]
impl<P: Platform> TaskRunner for Executor<P> {
    async fn run(
        &self,
        request: &TaskRequest,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<TaskOutcome, TaskError> {
        Executor::run(self, request, cancel, progress).await
    }
}

/// Builds live clients from [`AppConfig`] for every run, so a key or cookie
/// fixed in the environment takes effect on the next task.
pub struct ConfiguredRunner {
    config: AppConfig,
    store: Arc<dyn TaskStore>,
    aliases: Arc<BrandAliases>,
}

impl ConfiguredRunner {
    #[must_use]
    pub fn new(config: AppConfig, store: Arc<dyn TaskStore>, aliases: Arc<BrandAliases>) -> Self {
        Self {
            config,
            store,
            aliases,
        }
    }

    /// # Errors
    ///
    /// Returns [`TaskError::Config`] when the AI key or the platform cookie is
    /// missing (checked in that order), or the client construction error.
    pub fn build_executor(&self) -> Result<Executor<BilibiliClient>, TaskError> {
        let llm_options = LlmOptions::from_app_config(&self.config)?;
        if self
            .config
            .bilibili_cookie
            .as_deref()
            .is_none_or(|c| c.trim().is_empty())
        {
            return Err(ConfigError::MissingEnvVar("BILIBILI_COOKIE".to_string()).into());
        }

        let platform = BilibiliClient::new(ClientOptions::from_app_config(&self.config))?;
        let model = LlmClient::new(llm_options)?;
        Ok(Executor::new(
            Arc::new(platform),
            Arc::new(model),
            Arc::clone(&self.store),
            Arc::clone(&self.aliases),
        ))
    }
}

#[async_trait]
impl TaskRunner for ConfiguredRunner {
    async fn run(
        &self,
        request: &TaskRequest,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<TaskOutcome, TaskError> {
        progress
            .report(TaskStage::Searching, 0, "正在加载配置...")
            .await;
        let executor = self.build_executor()?;
        executor.run(request, cancel, progress).await
    }
}
