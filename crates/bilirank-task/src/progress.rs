//! Monotonic progress reporting for one task.

use std::sync::{Arc, Mutex, PoisonError};

use bilirank_core::{ProgressEvent, TaskStage};
use tokio::sync::mpsc::UnboundedSender;

use crate::store::TaskStore;

const TOTAL: u8 = 100;

#[derive(Debug, Clone, Copy)]
struct Position {
    stage: TaskStage,
    current: u8,
}

/// Pushes [`ProgressEvent`]s to an optional watcher and persists them to the
/// store.
///
/// Stage and percent only move forward: a report behind the last one is
/// clamped up to it. A recovered task re-runs from the start, so its reporter
/// is seeded with the persisted position and stays there until the re-run
/// catches up.
pub struct ProgressReporter {
    task_id: String,
    store: Arc<dyn TaskStore>,
    sender: Option<UnboundedSender<ProgressEvent>>,
    position: Mutex<Position>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        store: Arc<dyn TaskStore>,
        sender: Option<UnboundedSender<ProgressEvent>>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            store,
            sender,
            position: Mutex::new(Position {
                stage: TaskStage::Searching,
                current: 0,
            }),
        }
    }

    /// Starts from a persisted stage and percent instead of `searching 0`.
    #[must_use]
    pub fn resume_from(self, stage: TaskStage, current: u8) -> Self {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = Position {
            stage,
            current: current.min(TOTAL),
        };
        self
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Current clamped stage and percent.
    #[must_use]
    pub fn position(&self) -> (TaskStage, u8) {
        let pos = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        (pos.stage, pos.current)
    }

    fn advance(&self, stage: TaskStage, current: u8) -> Option<Position> {
        let mut pos = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        if pos.stage.is_terminal() {
            return None;
        }
        if pos.stage.can_transition_to(stage) {
            pos.stage = stage;
        }
        pos.current = pos.current.max(current.min(TOTAL));
        if pos.stage == TaskStage::Completed {
            pos.current = TOTAL;
        }
        Some(*pos)
    }

    /// Sends an event to the watcher without touching the store. Safe to call
    /// from synchronous progress callbacks.
    pub fn emit(&self, stage: TaskStage, current: u8, message: impl Into<String>) {
        let Some(pos) = self.advance(stage, current) else {
            return;
        };
        self.send(pos, message.into());
    }

    fn send(&self, pos: Position, message: String) {
        let Some(sender) = &self.sender else {
            return;
        };
        // A dropped receiver only means nobody is watching.
        let _ = sender.send(ProgressEvent {
            task_id: self.task_id.clone(),
            stage: pos.stage,
            current: pos.current,
            total: TOTAL,
            message,
        });
    }

    /// Emits an event and persists it with a fresh heartbeat.
    ///
    /// Terminal stages are not persisted here; the store's completion and
    /// failure calls own those writes. A failed write is logged and the task
    /// carries on.
    pub async fn report(&self, stage: TaskStage, current: u8, message: impl Into<String>) {
        let Some(pos) = self.advance(stage, current) else {
            return;
        };
        let message = message.into();
        if !pos.stage.is_terminal() {
            if let Err(e) = self
                .store
                .update_progress(&self.task_id, pos.stage, pos.current, &message)
                .await
            {
                tracing::warn!(task_id = %self.task_id, error = %e, "failed to persist task progress");
            }
        }
        tracing::debug!(task_id = %self.task_id, stage = %pos.stage, progress = pos.current, "{message}");
        self.send(pos, message);
    }
}

/// Linear interpolation of `done / total` into `[base, base + span]`.
#[must_use]
pub fn scaled(base: u8, span: u8, done: usize, total: usize) -> u8 {
    let total = total.max(1);
    let step = done.min(total) * usize::from(span) / total;
    base.saturating_add(u8::try_from(step).unwrap_or(span))
}
