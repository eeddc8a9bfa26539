//! kintsugi-pipeline: sans-IO photo restoration core.
//!
//! Runs a scanned photograph through an ordered chain of filter stages:
//! denoise -> auto contrast -> sharpen -> scratch repair -> encode.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and buffers and returns structured data. Task queuing,
//! engine loading, logging, and filesystem interaction live in
//! `kintsugi-queue` and the CLI.
//!
//! Image-filter primitives are consumed through the [`Engine`]
//! capability trait; [`BundledEngine`] backs it with `image`/`imageproc`.
//! Stages with fallback implementations (denoise, scratch repair) get
//! their variant chosen once per process in a [`CapabilityProfile`],
//! not re-probed per call.
//!
//! The run itself is an explicit state machine ([`Restoration`]) that
//! advances one stage per [`step`](Restoration::step) call, emitting
//! monotone progress checkpoints; [`restore`] drives it to completion
//! in one call.

pub mod buffer;
pub mod bundled;
pub mod contrast;
pub mod denoise;
pub mod encode;
pub mod engine;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod scratch;
pub mod sharpen;
pub mod stage;
pub mod types;

pub use buffer::ImageBuffer;
pub use bundled::BundledEngine;
pub use encode::MAX_OUTPUT_DIMENSION;
pub use engine::{Capabilities, Engine, EngineError};
pub use pipeline::{ProgressPhase, ProgressUpdate, Restoration, StepOutcome, restore};
pub use profile::{CapabilityProfile, DenoiseVariant, ScratchVariant};
pub use report::{RunReport, StageDisposition, StageRecord};
pub use stage::{FilterStage, StageError, StageFailure, StageKind};
pub use types::{
    ContrastSettings, DenoiseSettings, OutputFormat, OutputSettings, PipelineError,
    RestorationOptions, RestoredImage, ScratchSettings, SharpenSettings,
    SuperResolutionSettings,
};
