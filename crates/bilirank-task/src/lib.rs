//! Task orchestration for bilirank.
//!
//! A task moves `searching → scraping → analyzing → generating → completed`
//! (or `failed` from any active stage). Every step is persisted through a
//! [`TaskStore`] so a restarted process can recover what was running.

pub mod error;
pub mod executor;
pub mod maintenance;
pub mod manager;
pub mod platform;
pub mod progress;
pub mod recovery;
pub mod runner;
pub mod scheduler;
pub mod store;

pub use error::TaskError;
pub use executor::{filter_videos, prepare_inputs, Executor, ExecutorOptions, TaskOutcome};
pub use maintenance::{cleanup_timed_out_tasks, purge_raw_comments};
pub use manager::{drive_task, TaskHandle, TaskManager};
pub use platform::{Platform, VideoSearch};
pub use progress::{scaled, ProgressReporter};
pub use recovery::{recover_tasks, RecoveryReport, TIMEOUT_MESSAGE};
pub use runner::{ConfiguredRunner, TaskRunner};
pub use scheduler::{build_scheduler, RAW_COMMENT_PURGE_CRON, STALE_SWEEP_CRON};
pub use store::{MemoryTaskStore, PgTaskStore, StoreError, TaskStore};
