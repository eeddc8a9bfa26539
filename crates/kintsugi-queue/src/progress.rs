//! Task-tagged progress events.
//!
//! Progress is modeled as an ordered event stream, not shared mutable
//! state: the queue runner produces [`TaskEvent`]s (monotone progress,
//! exactly one terminal event per task) and any number of consumers
//! subscribe. Subscribers that hang up are pruned on the next emit.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::task::TaskId;

/// What happened to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEventKind {
    /// The task left the pending queue and started processing.
    Started,
    /// Progress advanced; `percent` is non-decreasing per task.
    Progress {
        /// Progress percent, 0–100.
        percent: u8,
        /// Human-readable stage description.
        message: String,
    },
    /// Terminal success.
    Completed {
        /// Wall-clock processing time.
        elapsed: Duration,
    },
    /// Terminal failure.
    Failed {
        /// Error text.
        error: String,
    },
    /// The task was removed (cancelled) and holds no resources.
    Removed,
}

/// One event on the queue's progress stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    /// Which task the event refers to.
    pub task_id: TaskId,
    /// What happened.
    pub kind: TaskEventKind,
}

/// Fan-out of [`TaskEvent`]s to all live subscribers.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    senders: Mutex<Vec<mpsc::UnboundedSender<TaskEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<TaskEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().push(sender);
        receiver
    }

    pub(crate) fn emit(&self, event: TaskEvent) {
        self.lock().retain(|sender| sender.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<TaskEvent>>> {
        self.senders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
