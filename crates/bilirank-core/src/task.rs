//! Task lifecycle types shared by the orchestrator and the persistence layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Dimension;
use crate::CoreError;

/// Pipeline stage of an analysis task.
///
/// Stages only move forward; `Failed` is reachable from every non-terminal
/// stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStage {
    Searching,
    Scraping,
    Analyzing,
    Generating,
    Completed,
    Failed,
}

impl TaskStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStage::Searching => "searching",
            TaskStage::Scraping => "scraping",
            TaskStage::Analyzing => "analyzing",
            TaskStage::Generating => "generating",
            TaskStage::Completed => "completed",
            TaskStage::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStage::Completed | TaskStage::Failed)
    }

    fn ordinal(self) -> u8 {
        match self {
            TaskStage::Searching => 0,
            TaskStage::Scraping => 1,
            TaskStage::Analyzing => 2,
            TaskStage::Generating => 3,
            TaskStage::Completed => 4,
            TaskStage::Failed => 5,
        }
    }

    /// Whether a task currently in `self` may record a transition to `next`.
    ///
    /// Staying in the same non-terminal stage is allowed so progress can be
    /// updated within a stage.
    #[must_use]
    pub fn can_transition_to(self, next: TaskStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == TaskStage::Failed {
            return true;
        }
        next.ordinal() >= self.ordinal()
    }

    /// Returns `Ok(())` when the transition is legal.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalTransition`] for backward moves or moves out
    /// of a terminal stage.
    pub fn check_transition(self, next: TaskStage) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskStage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "searching" => Ok(TaskStage::Searching),
            "scraping" => Ok(TaskStage::Scraping),
            "analyzing" => Ok(TaskStage::Analyzing),
            "generating" => Ok(TaskStage::Generating),
            "completed" => Ok(TaskStage::Completed),
            "failed" => Ok(TaskStage::Failed),
            other => Err(CoreError::InvalidStage(other.to_string())),
        }
    }
}

/// Tunable limits carried with every task request so a recovered task runs
/// with the same settings it was submitted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskLimits {
    pub max_videos_per_keyword: usize,
    /// Global comment budget split across videos.
    pub max_comments: usize,
    pub min_comments_per_video: usize,
    pub max_comments_per_video: usize,
    /// Videos scraped concurrently.
    pub max_concurrency: usize,
    /// Analysis batches in flight.
    pub ai_batch_concurrency: usize,
    pub request_delay_ms: u64,
    /// Videos shorter than this are dropped. `0` disables the filter.
    pub min_video_duration_secs: u32,
    /// Only videos published within this many months are kept. `0` disables the filter.
    pub video_date_range_months: u32,
    /// Videos with fewer comments are dropped. `0` disables the filter.
    pub min_video_comments: u64,
}

impl Default for TaskLimits {
    fn default() -> Self {
        Self {
            max_videos_per_keyword: 20,
            max_comments: 500,
            min_comments_per_video: 10,
            max_comments_per_video: 200,
            max_concurrency: 5,
            ai_batch_concurrency: 5,
            request_delay_ms: 200,
            min_video_duration_secs: 30,
            video_date_range_months: 0,
            min_video_comments: 0,
        }
    }
}

/// The original request of a task. Persisted as JSON so recovery can
/// re-execute the pipeline from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
    /// Product category, e.g. `扫地机器人`.
    pub category: String,
    pub keywords: Vec<String>,
    /// User-declared brands. Discovered brands are kept alongside these.
    pub brands: Vec<String>,
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub limits: TaskLimits,
}

impl TaskRequest {
    /// Creates a request with a fresh task ID and default limits.
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        keywords: Vec<String>,
        brands: Vec<String>,
        dimensions: Vec<Dimension>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            category: category.into(),
            keywords,
            brands,
            dimensions,
            limits: TaskLimits::default(),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: TaskLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Checks that there is something to search for and to score against.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRequest`] when no keyword is non-blank,
    /// when there are no dimensions, or when a dimension name is blank.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(CoreError::InvalidRequest("no search keywords".to_string()));
        }
        if self.dimensions.is_empty() {
            return Err(CoreError::InvalidRequest("no evaluation dimensions".to_string()));
        }
        if self.dimensions.iter().any(|d| d.name.trim().is_empty()) {
            return Err(CoreError::InvalidRequest("blank dimension name".to_string()));
        }
        Ok(())
    }
}

/// Persisted task-recovery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub request: TaskRequest,
    pub stage: TaskStage,
    pub progress: u8,
    pub message: String,
    /// `None` for records written before heartbeats were tracked.
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub report_id: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    #[must_use]
    pub fn new(request: TaskRequest, now: DateTime<Utc>) -> Self {
        Self {
            task_id: request.task_id.clone(),
            request,
            stage: TaskStage::Searching,
            progress: 0,
            message: String::new(),
            heartbeat_at: Some(now),
            report_id: None,
            error_message: None,
            created_at: now,
        }
    }

    /// True when the heartbeat is older than `threshold` relative to `now`.
    /// A record without a heartbeat is never stale.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.heartbeat_at
            .is_some_and(|beat| now.signed_duration_since(beat) > threshold)
    }
}

/// Progress tuple pushed to whoever is watching a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: String,
    pub stage: TaskStage,
    pub current: u8,
    pub total: u8,
    pub message: String,
}
