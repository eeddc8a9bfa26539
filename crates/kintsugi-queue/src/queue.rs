//! The task queue: sequential, cancellable restoration runs.
//!
//! One queue holds up to a handful of accepted source images and
//! processes them strictly one at a time -- image filtering is memory-
//! and CPU-hungry, so concurrent runs are a design non-goal, not a
//! missing feature. Each stage executes on the blocking pool with an
//! await point in between, so the async runtime (and any UI it backs)
//! stays responsive during a run.
//!
//! Failure is isolated per task: a failed restoration marks its own
//! task and the runner moves on. Only an engine that never becomes
//! ready fails the remaining *pending* tasks wholesale.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use kintsugi_pipeline::{
    Restoration, RestorationOptions, RestoredImage, StepOutcome,
};

use crate::loader::{CapabilityLoader, ReadyEngine};
use crate::progress::{EventBus, TaskEvent, TaskEventKind};
use crate::task::{TaskId, TaskSnapshot, TaskStatus};
use crate::validate::{QueueLimits, ValidationError, validate_source};

/// Aggregate outcome of one [`TaskQueue::run_all`] batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// Tasks that reached `Completed`.
    pub succeeded: usize,
    /// Tasks that reached `Failed`.
    pub failed: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

struct TaskEntry {
    id: TaskId,
    name: String,
    status: TaskStatus,
    progress: u8,
    stage_message: Option<String>,
    error: Option<String>,
    started_at: Option<Instant>,
    elapsed: Option<std::time::Duration>,
    source: Option<Vec<u8>>,
    result: Option<Arc<RestoredImage>>,
    cancel_requested: bool,
}

impl TaskEntry {
    fn new(id: TaskId, name: String, source: Vec<u8>) -> Self {
        Self {
            id,
            name,
            status: TaskStatus::Pending,
            progress: 0,
            stage_message: None,
            error: None,
            started_at: None,
            elapsed: None,
            source: Some(source),
            result: None,
            cancel_requested: false,
        }
    }

    /// Apply a status transition if it is legal; illegal moves are
    /// dropped rather than corrupting monotonicity.
    fn advance(&mut self, next: TaskStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            progress: self.progress,
            stage_message: self.stage_message.clone(),
            error: self.error.clone(),
            elapsed: self.elapsed,
            result: self.result.clone(),
        }
    }
}

struct Inner {
    entries: Vec<TaskEntry>,
    next_id: u64,
}

enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Serializes restoration runs over the accepted source images.
///
/// Cheap to clone; clones share the same task table and event stream.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Mutex<Inner>>,
    loader: Arc<CapabilityLoader>,
    events: Arc<EventBus>,
    options: RestorationOptions,
    limits: QueueLimits,
}

impl TaskQueue {
    /// Create a queue over the given loader, restoration options, and
    /// acceptance limits.
    #[must_use]
    pub fn new(
        loader: Arc<CapabilityLoader>,
        options: RestorationOptions,
        limits: QueueLimits,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: Vec::new(),
                next_id: 1,
            })),
            loader,
            events: Arc::new(EventBus::default()),
            options: options.clamped(),
            limits,
        }
    }

    /// Accept a source file into the queue.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the file is not an image,
    /// exceeds the size ceiling, or the queue is full. No task is
    /// created on rejection.
    pub fn enqueue(
        &self,
        name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<TaskId, ValidationError> {
        let name = name.into();
        let mut inner = self.lock();
        validate_source(&bytes, inner.entries.len(), &self.limits)?;

        let id = TaskId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push(TaskEntry::new(id, name.clone(), bytes));
        debug!(task = %id, %name, "task enqueued");
        Ok(id)
    }

    /// Process every pending task, strictly one at a time, and return
    /// the aggregate counts.
    ///
    /// A failed task never blocks the tasks behind it. If the engine
    /// cannot be made ready, every still-pending task is failed with
    /// the capability error; tasks already terminal are untouched.
    pub async fn run_all(&self) -> BatchSummary {
        let ready = match self.loader.ensure_ready().await {
            Ok(ready) => ready,
            Err(error) => {
                warn!(%error, "engine unavailable; failing pending tasks");
                let summary = self.fail_all_pending(&error.to_string());
                info!(%summary, "batch finished");
                return summary;
            }
        };

        let mut summary = BatchSummary::default();
        while let Some((id, bytes)) = self.claim_next_pending() {
            match self.process_task(id, bytes, &ready).await {
                RunOutcome::Completed => summary.succeeded += 1,
                RunOutcome::Failed => summary.failed += 1,
                RunOutcome::Cancelled => {}
            }
        }
        info!(%summary, "batch finished");
        summary
    }

    /// Cancel a task: a pending (or terminal) task is removed
    /// immediately, releasing its buffers and result; a task currently
    /// processing is flagged and removed once its in-flight stage
    /// completes (no preemption of a running filter). Returns `false`
    /// as a no-op for unknown or already-removed ids.
    pub fn cancel_or_remove(&self, id: TaskId) -> bool {
        let mut inner = self.lock();
        let Some(index) = inner.entries.iter().position(|e| e.id == id) else {
            return false;
        };

        if inner.entries[index].status == TaskStatus::Processing {
            inner.entries[index].cancel_requested = true;
            debug!(task = %id, "cancel requested for in-flight task");
        } else {
            inner.entries.remove(index);
            drop(inner);
            debug!(task = %id, "task removed");
            self.events.emit(TaskEvent {
                task_id: id,
                kind: TaskEventKind::Removed,
            });
        }
        true
    }

    /// Subscribe to the ordered event stream for all tasks.
    #[must_use]
    pub fn subscribe(&self) -> UnboundedReceiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Snapshot one task.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.lock()
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(TaskEntry::snapshot)
    }

    /// Snapshot every task currently held by the queue.
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.lock().entries.iter().map(TaskEntry::snapshot).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail_all_pending(&self, error: &str) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let mut failed_ids = Vec::new();
        {
            let mut inner = self.lock();
            for entry in &mut inner.entries {
                if entry.status == TaskStatus::Pending && entry.advance(TaskStatus::Failed) {
                    entry.error = Some(error.to_string());
                    entry.source = None;
                    failed_ids.push(entry.id);
                    summary.failed += 1;
                }
            }
        }
        for id in failed_ids {
            self.events.emit(TaskEvent {
                task_id: id,
                kind: TaskEventKind::Failed {
                    error: error.to_string(),
                },
            });
        }
        summary
    }

    /// Claim the first pending task: mark it processing and take its
    /// source bytes.
    fn claim_next_pending(&self) -> Option<(TaskId, Vec<u8>)> {
        let claimed = {
            let mut inner = self.lock();
            let entry = inner
                .entries
                .iter_mut()
                .find(|e| e.status == TaskStatus::Pending)?;
            if !entry.advance(TaskStatus::Processing) {
                return None;
            }
            entry.started_at = Some(Instant::now());
            entry.source.take().map(|bytes| (entry.id, bytes))
        };

        let (id, bytes) = claimed?;
        debug!(task = %id, "task processing");
        self.events.emit(TaskEvent {
            task_id: id,
            kind: TaskEventKind::Started,
        });
        Some((id, bytes))
    }

    async fn process_task(&self, id: TaskId, bytes: Vec<u8>, ready: &ReadyEngine) -> RunOutcome {
        let mut machine = Restoration::new(
            Arc::clone(&ready.engine),
            ready.profile,
            self.options,
            bytes,
        );

        loop {
            // Removal mid-processing is best-effort: honored between
            // stages, never by preempting a running filter.
            if self.take_cancel_request(id) {
                self.remove_cancelled(id);
                return RunOutcome::Cancelled;
            }

            let step = tokio::task::spawn_blocking(move || {
                let mut machine = machine;
                let outcome = machine.step();
                (machine, outcome)
            })
            .await;

            let (returned, outcome) = match step {
                Ok(pair) => pair,
                Err(join_error) => {
                    self.fail_task(id, &format!("restoration worker aborted: {join_error}"));
                    return RunOutcome::Failed;
                }
            };
            machine = returned;

            match outcome {
                Ok(StepOutcome::Progress(update)) => {
                    if let Some(note) = &update.note {
                        warn!(task = %id, %note, "stage degraded");
                    }
                    self.record_progress(id, update.percent, update.phase.to_string());
                }
                Ok(StepOutcome::Finished(image)) => {
                    self.complete_task(id, image);
                    return RunOutcome::Completed;
                }
                Err(error) => {
                    self.fail_task(id, &error.to_string());
                    return RunOutcome::Failed;
                }
            }
        }
    }

    fn take_cancel_request(&self, id: TaskId) -> bool {
        self.lock()
            .entries
            .iter()
            .any(|e| e.id == id && e.cancel_requested)
    }

    fn remove_cancelled(&self, id: TaskId) {
        {
            let mut inner = self.lock();
            inner.entries.retain(|e| e.id != id);
        }
        info!(task = %id, "cancelled task removed");
        self.events.emit(TaskEvent {
            task_id: id,
            kind: TaskEventKind::Removed,
        });
    }

    fn record_progress(&self, id: TaskId, percent: u8, message: String) {
        {
            let mut inner = self.lock();
            if let Some(entry) = inner.entries.iter_mut().find(|e| e.id == id) {
                entry.progress = entry.progress.max(percent);
                entry.stage_message = Some(message.clone());
            }
        }
        self.events.emit(TaskEvent {
            task_id: id,
            kind: TaskEventKind::Progress { percent, message },
        });
    }

    fn complete_task(&self, id: TaskId, image: RestoredImage) {
        let skipped = image.report.skipped_stages();
        let elapsed = {
            let mut inner = self.lock();
            let Some(entry) = inner.entries.iter_mut().find(|e| e.id == id) else {
                return;
            };
            if !entry.advance(TaskStatus::Completed) {
                return;
            }
            let elapsed = entry
                .started_at
                .map_or_else(Default::default, |t| t.elapsed());
            entry.elapsed = Some(elapsed);
            entry.progress = 100;
            entry.stage_message = None;
            entry.result = Some(Arc::new(image));
            elapsed
        };

        info!(task = %id, ?elapsed, ?skipped, "task completed");
        self.events.emit(TaskEvent {
            task_id: id,
            kind: TaskEventKind::Progress {
                percent: 100,
                message: "Completed".to_string(),
            },
        });
        self.events.emit(TaskEvent {
            task_id: id,
            kind: TaskEventKind::Completed { elapsed },
        });
    }

    fn fail_task(&self, id: TaskId, error: &str) {
        {
            let mut inner = self.lock();
            let Some(entry) = inner.entries.iter_mut().find(|e| e.id == id) else {
                return;
            };
            if !entry.advance(TaskStatus::Failed) {
                return;
            }
            entry.error = Some(error.to_string());
            entry.elapsed = entry.started_at.map(|t| t.elapsed());
        }

        warn!(task = %id, error, "task failed");
        self.events.emit(TaskEvent {
            task_id: id,
            kind: TaskEventKind::Failed {
                error: error.to_string(),
            },
        });
    }
}
