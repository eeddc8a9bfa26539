//! The restoration pipeline state machine.
//!
//! [`Restoration`] runs one source image through the enabled filter
//! stages in fixed order, then encodes the result:
//!
//! ```text
//! Preparing -> Running(stage i) -> Encoding -> Done | Failed
//! ```
//!
//! The machine is deliberately resumable: each [`step`](Restoration::step)
//! call performs exactly one state's work (decode, one stage, or the
//! final encode) and returns, so a host can yield control between
//! CPU-bound stages -- the progress checkpoints fall out of the same
//! step boundaries. [`restore`] drives the machine to completion for
//! callers that do not need cooperative scheduling.
//!
//! Recoverable stage failures (see [`StageError::is_fatal`]) keep the
//! pre-stage buffer and continue; only decode, encode, and the
//! explicitly fatal stage errors reach `Failed`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::ImageBuffer;
use crate::encode::{MAX_OUTPUT_DIMENSION, clamp_dimensions, encode_output};
use crate::engine::Engine;
use crate::profile::CapabilityProfile;
use crate::report::{RunReport, StageDisposition};
use crate::stage::{FilterStage, StageError, StageKind, enabled_stages};
use crate::types::{PipelineError, RestorationOptions, RestoredImage};

/// Progress percent reported once the source image is decoded.
pub const PREPARED_CHECKPOINT: u8 = 10;

/// Progress percent reported when encoding begins.
pub const ENCODING_CHECKPOINT: u8 = 90;

/// Which phase of the run a progress update refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Decoding the source and building the stage list.
    Preparing,
    /// One filter stage completed (or was skipped).
    Stage(StageKind),
    /// All stages done; final downscale + encode starting.
    Encoding,
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preparing => f.write_str("Preparing"),
            Self::Stage(kind) => f.write_str(kind.label()),
            Self::Encoding => f.write_str("Encoding"),
        }
    }
}

/// One progress emission from the state machine.
///
/// Percentages are monotone non-decreasing over a run; completion
/// (100) is implied by [`StepOutcome::Finished`] rather than emitted
/// separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Progress percent, 0–100.
    pub percent: u8,
    /// What just happened.
    pub phase: ProgressPhase,
    /// Degradation note: a skipped stage, or a requested-but-unavailable
    /// feature. `None` on the happy path.
    pub note: Option<String>,
}

/// Result of one `step()` call.
#[derive(Debug)]
pub enum StepOutcome {
    /// The machine advanced; more steps remain.
    Progress(ProgressUpdate),
    /// Terminal success carrying the encoded result.
    Finished(RestoredImage),
}

enum State {
    Preparing {
        bytes: Vec<u8>,
    },
    Running {
        buffer: ImageBuffer,
        stages: VecDeque<Box<dyn FilterStage>>,
    },
    Encoding {
        buffer: ImageBuffer,
    },
    Done,
    Failed,
}

/// A single restoration run over one source image.
pub struct Restoration {
    engine: Arc<dyn Engine>,
    profile: CapabilityProfile,
    options: RestorationOptions,
    state: State,
    report: RunReport,
    started: Instant,
}

impl Restoration {
    /// Set up a run. Options are clamped here, once; no validation can
    /// fail.
    #[must_use]
    pub fn new(
        engine: Arc<dyn Engine>,
        profile: CapabilityProfile,
        options: RestorationOptions,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            engine,
            profile,
            options: options.clamped(),
            state: State::Preparing { bytes },
            report: RunReport::default(),
            started: Instant::now(),
        }
    }

    /// Whether the machine has reached `Done` or `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.state, State::Done | State::Failed)
    }

    /// Advance the machine by one state's worth of work.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`PipelineError`] that moved the machine to
    /// `Failed`, or [`PipelineError::InvalidState`] when called on a
    /// machine already in a terminal state. Errors are terminal: any
    /// live buffer is released and no further transitions happen.
    pub fn step(&mut self) -> Result<StepOutcome, PipelineError> {
        if self.is_terminal() {
            return Err(PipelineError::InvalidState);
        }

        // `Failed` stands in while we own the state; every success path
        // below writes the real successor, so an early error return
        // leaves the machine failed with all buffers dropped.
        match std::mem::replace(&mut self.state, State::Failed) {
            State::Preparing { bytes } => self.prepare(&bytes),
            State::Running { buffer, stages } => self.run_next_stage(buffer, stages),
            State::Encoding { buffer } => self.encode(buffer),
            State::Done | State::Failed => Err(PipelineError::InvalidState),
        }
    }

    fn prepare(&mut self, bytes: &[u8]) -> Result<StepOutcome, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let buffer = self.engine.decode(bytes).map_err(PipelineError::Decode)?;
        if !buffer.is_valid() {
            return Err(PipelineError::Decode(crate::engine::EngineError::Malformed(
                "decoded image has no pixels".to_string(),
            )));
        }

        let note = if self.options.super_resolution.enabled {
            self.report.super_resolution_unavailable = true;
            Some(format!(
                "{} is not available and will not run",
                StageKind::SuperResolution.label(),
            ))
        } else {
            None
        };

        let stages: VecDeque<Box<dyn FilterStage>> = enabled_stages(&self.options).into();
        self.state = State::Running { buffer, stages };
        Ok(StepOutcome::Progress(ProgressUpdate {
            percent: PREPARED_CHECKPOINT,
            phase: ProgressPhase::Preparing,
            note,
        }))
    }

    fn run_next_stage(
        &mut self,
        buffer: ImageBuffer,
        mut stages: VecDeque<Box<dyn FilterStage>>,
    ) -> Result<StepOutcome, PipelineError> {
        let Some(stage) = stages.pop_front() else {
            self.state = State::Encoding { buffer };
            return Ok(StepOutcome::Progress(ProgressUpdate {
                percent: ENCODING_CHECKPOINT,
                phase: ProgressPhase::Encoding,
                note: None,
            }));
        };

        let kind = stage.kind();
        let percent = kind.checkpoint().unwrap_or(ENCODING_CHECKPOINT);
        let stage_start = Instant::now();

        match stage.apply(self.engine.as_ref(), &self.profile, buffer) {
            Ok(output) => {
                if !output.is_valid() {
                    // Stages validate their own output, so this guard
                    // firing means the stage broke its contract.
                    return Err(PipelineError::CorruptBuffer(kind));
                }
                self.report.record(
                    kind,
                    stage_start.elapsed(),
                    StageDisposition::Applied {
                        variant: self.variant_label(kind),
                    },
                );
                self.state = State::Running {
                    buffer: output,
                    stages,
                };
                Ok(StepOutcome::Progress(ProgressUpdate {
                    percent,
                    phase: ProgressPhase::Stage(kind),
                    note: None,
                }))
            }
            Err(failure) => {
                if failure.error.is_fatal() {
                    return Err(PipelineError::Stage {
                        stage: kind,
                        error: failure.error,
                    });
                }
                let note = format!("{} skipped: {}", kind.label(), failure.error);
                self.report.record(
                    kind,
                    stage_start.elapsed(),
                    StageDisposition::Skipped {
                        reason: failure.error.to_string(),
                    },
                );
                // Continue with the unmodified pre-stage buffer.
                self.state = State::Running {
                    buffer: failure.input,
                    stages,
                };
                Ok(StepOutcome::Progress(ProgressUpdate {
                    percent,
                    phase: ProgressPhase::Stage(kind),
                    note: Some(note),
                }))
            }
        }
    }

    fn encode(&mut self, buffer: ImageBuffer) -> Result<StepOutcome, PipelineError> {
        let (buffer, downscaled) =
            clamp_dimensions(self.engine.as_ref(), buffer, MAX_OUTPUT_DIMENSION)?;
        self.report.downscaled = downscaled;

        let bytes = encode_output(self.engine.as_ref(), &buffer, self.options.output)?;
        self.report.total_duration = self.started.elapsed();

        let result = RestoredImage {
            bytes,
            format: self.options.output.format,
            width: buffer.width(),
            height: buffer.height(),
            report: self.report.clone(),
        };
        self.state = State::Done;
        Ok(StepOutcome::Finished(result))
    }

    /// Variant label for stages with fallback chains, for the report.
    fn variant_label(&self, kind: StageKind) -> Option<String> {
        match kind {
            StageKind::Denoise => Some(self.profile.denoise.to_string()),
            StageKind::ScratchRepair => Some(self.profile.scratch.to_string()),
            StageKind::AutoContrast | StageKind::Sharpen | StageKind::SuperResolution => None,
        }
    }
}

/// Drive a [`Restoration`] to completion, invoking `on_progress` for
/// every intermediate update.
///
/// # Errors
///
/// Returns the first fatal [`PipelineError`].
pub fn restore(
    engine: Arc<dyn Engine>,
    profile: CapabilityProfile,
    options: RestorationOptions,
    bytes: Vec<u8>,
    mut on_progress: impl FnMut(&ProgressUpdate),
) -> Result<RestoredImage, PipelineError> {
    let mut machine = Restoration::new(engine, profile, options, bytes);
    loop {
        match machine.step()? {
            StepOutcome::Progress(update) => on_progress(&update),
            StepOutcome::Finished(result) => return Ok(result),
        }
    }
}
