//! Restoration task identity, status, and observable snapshots.
//!
//! Task status is monotonic by construction: the only legal moves are
//! `Pending -> Processing -> (Completed | Failed)`, plus the direct
//! `Pending -> Failed` edge used when the engine never becomes
//! available. A terminal task never transitions again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kintsugi_pipeline::RestoredImage;

/// Opaque identity token for a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, waiting for the queue runner.
    Pending,
    /// Currently being restored.
    Processing,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// Whether the status is one of the two terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal (monotonic)
    /// transition.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending | Self::Processing, Self::Failed)
                | (Self::Processing, Self::Completed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Processing => f.write_str("processing"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A point-in-time view of one task, safe to hand to observers.
///
/// The result is shared via `Arc` so snapshots stay cheap even when the
/// encoded output is large.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    /// Task identity.
    pub id: TaskId,
    /// Source file name, for display.
    pub name: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Progress percent, 0–100, non-decreasing over the task's life.
    pub progress: u8,
    /// Human-readable description of the current stage, when processing.
    pub stage_message: Option<String>,
    /// Error text, set only on failed tasks.
    pub error: Option<String>,
    /// Wall-clock processing time, set once terminal.
    pub elapsed: Option<Duration>,
    /// The restored image, set only on completed tasks.
    pub result: Option<Arc<RestoredImage>>,
}
