//! Filter stage identifiers and the stage contract.
//!
//! Each [`StageKind`] names one logical transform in the restoration
//! chain. Stages implement [`FilterStage`]: they consume the input
//! buffer on success and hand it back untouched inside
//! [`StageFailure`] on failure, so the pipeline can skip a broken stage
//! and continue with the pre-stage image.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::ImageBuffer;
use crate::contrast::AutoContrast;
use crate::denoise::Denoise;
use crate::engine::{Engine, EngineError};
use crate::profile::CapabilityProfile;
use crate::scratch::ScratchRepair;
use crate::sharpen::Sharpen;
use crate::types::RestorationOptions;

/// Identifier for a restoration stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// Grain and sensor-noise reduction.
    Denoise,
    /// Global contrast/brightness normalization.
    AutoContrast,
    /// Unsharp-mask style edge enhancement.
    Sharpen,
    /// Scratch detection and inpainting.
    ScratchRepair,
    /// Reserved; no filter chain implements this yet.
    SuperResolution,
}

impl StageKind {
    /// The runnable stages in required execution order.
    ///
    /// [`SuperResolution`](Self::SuperResolution) is deliberately
    /// absent: it is reported as unavailable, never executed.
    pub const ORDERED: [Self; 4] = [
        Self::Denoise,
        Self::AutoContrast,
        Self::Sharpen,
        Self::ScratchRepair,
    ];

    /// Display label for the stage.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Denoise => "Denoise",
            Self::AutoContrast => "Auto contrast",
            Self::Sharpen => "Sharpen",
            Self::ScratchRepair => "Scratch repair",
            Self::SuperResolution => "Super resolution",
        }
    }

    /// Progress checkpoint (percent) reached once this stage has run --
    /// or been skipped. `None` for the reserved stage, which the
    /// pipeline never executes.
    #[must_use]
    pub const fn checkpoint(self) -> Option<u8> {
        match self {
            Self::Denoise => Some(20),
            Self::AutoContrast => Some(40),
            Self::Sharpen => Some(60),
            Self::ScratchRepair => Some(80),
            Self::SuperResolution => None,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a stage could not produce a usable output.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// An engine primitive failed.
    #[error("filter primitive failed: {0}")]
    Primitive(#[from] EngineError),

    /// The stage produced an empty output buffer.
    #[error("stage produced an empty output buffer")]
    EmptyOutput,

    /// The stage changed the image dimensions.
    ///
    /// Fatal when raised by sharpen: a convolution that resized the
    /// image indicates engine misbehavior the pipeline cannot paper
    /// over.
    #[error("stage changed dimensions from {expected_width}x{expected_height} to {actual_width}x{actual_height}")]
    DimensionMismatch {
        /// Input width.
        expected_width: u32,
        /// Input height.
        expected_height: u32,
        /// Output width.
        actual_width: u32,
        /// Output height.
        actual_height: u32,
    },

    /// Stage-internal composition failed (e.g. a luminance plane with
    /// mismatched dimensions). Never fatal.
    #[error("{0}")]
    Internal(String),
}

impl StageError {
    /// Whether this error must fail the whole run instead of degrading
    /// to a skipped stage.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }
}

/// A failed stage application, carrying the untouched input buffer
/// back to the caller.
///
/// This is what makes stage failure recoverable without copies: the
/// pipeline regains ownership of the pre-stage image and decides
/// whether to skip (recoverable) or abort (fatal).
#[derive(Debug)]
pub struct StageFailure {
    /// The input buffer, returned unmodified.
    pub input: ImageBuffer,
    /// What went wrong.
    pub error: StageError,
}

impl StageFailure {
    /// Bundle an error with the returned input buffer.
    #[must_use]
    pub fn new(input: ImageBuffer, error: impl Into<StageError>) -> Self {
        Self {
            input,
            error: error.into(),
        }
    }
}

/// A single-responsibility transform over one [`ImageBuffer`].
pub trait FilterStage: Send + Sync {
    /// Which stage this is.
    fn kind(&self) -> StageKind;

    /// Apply the transform. Consumes `input` and returns the new buffer
    /// on success; on failure the input comes back inside the
    /// [`StageFailure`].
    fn apply(
        &self,
        engine: &dyn Engine,
        profile: &CapabilityProfile,
        input: ImageBuffer,
    ) -> Result<ImageBuffer, StageFailure>;
}

/// Validate a stage output before it replaces the stage input.
///
/// Returns the output when it is non-empty; otherwise hands the input
/// back inside a [`StageFailure`] with [`StageError::EmptyOutput`].
pub(crate) fn accept_output(
    input: ImageBuffer,
    output: ImageBuffer,
) -> Result<ImageBuffer, StageFailure> {
    if output.is_valid() {
        Ok(output)
    } else {
        Err(StageFailure::new(input, StageError::EmptyOutput))
    }
}

/// Build the enabled stages in required execution order.
#[must_use]
pub fn enabled_stages(options: &RestorationOptions) -> Vec<Box<dyn FilterStage>> {
    let mut stages: Vec<Box<dyn FilterStage>> = Vec::new();
    if options.denoise.enabled {
        stages.push(Box::new(Denoise::new(options.denoise)));
    }
    if options.auto_contrast.enabled {
        stages.push(Box::new(AutoContrast::new(options.auto_contrast)));
    }
    if options.sharpen.enabled {
        stages.push(Box::new(Sharpen::new(options.sharpen)));
    }
    if options.scratch_repair.enabled {
        stages.push(Box::new(ScratchRepair::new(options.scratch_repair)));
    }
    stages
}
