//! kintsugi-queue: async orchestration around the restoration pipeline.
//!
//! Sits between the sans-IO `kintsugi-pipeline` core and a front end:
//!
//! - [`CapabilityLoader`] locates and initializes the image-processing
//!   engine (bundled source first, then fallbacks) behind an init-once,
//!   bounded-wait ready gate.
//! - [`TaskQueue`] validates and holds uploaded images, runs them
//!   through the pipeline strictly one at a time on the blocking pool,
//!   and supports best-effort cancellation.
//! - [`TaskEvent`]s form an ordered, task-tagged progress stream any
//!   number of consumers can subscribe to.
//!
//! Recoverable degradation (skipped stages, fallback variants) is
//! logged here via `tracing`; the pipeline core stays log-free.

pub mod loader;
pub mod progress;
pub mod queue;
pub mod task;
pub mod validate;

pub use loader::{BundledSource, CapabilityError, CapabilityLoader, EngineSource, ReadyEngine};
pub use progress::{TaskEvent, TaskEventKind};
pub use queue::{BatchSummary, TaskQueue};
pub use task::{TaskId, TaskSnapshot, TaskStatus};
pub use validate::{QueueLimits, ValidationError};
