//! Shared types for the kintsugi restoration pipeline.

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::report::RunReport;
use crate::stage::{StageError, StageKind};

/// Re-export `RgbaImage` so downstream crates can reference raster data
/// without depending on `image` directly.
pub use image::RgbaImage;

/// Re-export `GrayImage`; used for luminance planes and scratch masks.
pub use image::GrayImage;

/// Output encoding for the restored image.
///
/// Quality (50–100) applies to JPEG only. PNG is always lossless and
/// WebP is encoded losslessly by the bundled engine, so both ignore the
/// quality setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JPEG, lossy; honors the quality setting.
    Jpg,
    /// PNG, lossless.
    #[default]
    Png,
    /// WebP, lossless in this implementation.
    Webp,
}

impl OutputFormat {
    /// Conventional file extension for the format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Settings for the denoise stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseSettings {
    /// Whether the stage runs at all.
    pub enabled: bool,
    /// Smoothing strength, 0–100. Clamped before use.
    pub strength: u8,
}

impl Default for DenoiseSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 50,
        }
    }
}

/// Settings for the auto-contrast stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastSettings {
    /// Whether the stage runs at all.
    pub enabled: bool,
    /// Contrast strength, 0–100. Scales the blend linearly so that the
    /// default strength of 50 reproduces the reference blend exactly.
    pub strength: u8,
    /// Fraction of equalized luminance mixed into the output at
    /// strength 50. The 0.30 default (70% original / 30% enhanced) is an
    /// empirical constant kept configurable rather than derived.
    pub blend: f32,
}

impl Default for ContrastSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 50,
            blend: 0.30,
        }
    }
}

/// Settings for the sharpen stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpenSettings {
    /// Whether the stage runs at all.
    pub enabled: bool,
    /// Sharpening strength, 0–100. Clamped before use.
    pub strength: u8,
    /// Maximum center-weight gain of the 3×3 kernel, reached at
    /// strength 100. Another empirical constant kept configurable.
    pub boost: f32,
}

impl Default for SharpenSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 50,
            boost: 0.5,
        }
    }
}

/// Settings for the scratch-repair stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchSettings {
    /// Whether the stage runs at all.
    pub enabled: bool,
    /// Detection aggressiveness, 0–100. Higher values lower the edge
    /// thresholds so fainter scratches are caught. Clamped before use.
    pub strength: u8,
}

impl Default for ScratchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 50,
        }
    }
}

/// Settings for the reserved super-resolution stage.
///
/// No filter chain implements this stage yet. Enabling it is reported
/// to the caller as unavailable rather than silently skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperResolutionSettings {
    /// Whether the caller requested the stage.
    pub enabled: bool,
}

/// Output encoding settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Encoded output format.
    pub format: OutputFormat,
    /// Encode quality, 50–100. Clamped before use; see [`OutputFormat`]
    /// for which formats honor it.
    pub quality: u8,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: 90,
        }
    }
}

/// Full configuration for one restoration run.
///
/// All parameters have defaults matching the reference behavior. Out of
/// range values are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RestorationOptions {
    /// Denoise stage settings.
    pub denoise: DenoiseSettings,
    /// Auto-contrast stage settings.
    pub auto_contrast: ContrastSettings,
    /// Sharpen stage settings.
    pub sharpen: SharpenSettings,
    /// Scratch-repair stage settings.
    pub scratch_repair: ScratchSettings,
    /// Reserved super-resolution stage settings.
    pub super_resolution: SuperResolutionSettings,
    /// Output encoding settings.
    pub output: OutputSettings,
}

impl RestorationOptions {
    /// Return a copy with every strength clamped to 0–100, quality
    /// clamped to 50–100, and the blend/boost constants clamped to
    /// sane ranges.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.denoise.strength = self.denoise.strength.min(100);
        self.auto_contrast.strength = self.auto_contrast.strength.min(100);
        self.auto_contrast.blend = self.auto_contrast.blend.clamp(0.0, 1.0);
        self.sharpen.strength = self.sharpen.strength.min(100);
        self.sharpen.boost = self.sharpen.boost.clamp(0.0, 8.0);
        self.scratch_repair.strength = self.scratch_repair.strength.min(100);
        self.output.quality = self.output.quality.clamp(50, 100);
        self
    }
}

/// The final product of a successful restoration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoredImage {
    /// Encoded output bytes.
    pub bytes: Vec<u8>,
    /// Format the bytes are encoded in.
    pub format: OutputFormat,
    /// Output width in pixels (after any final downscale).
    pub width: u32,
    /// Output height in pixels (after any final downscale).
    pub height: u32,
    /// Per-stage timings and degradation records for the run.
    pub report: RunReport,
}

/// Errors that end a restoration run.
///
/// Individual stage failures are *not* in this taxonomy unless they
/// escalate: a recoverable [`StageError`] is absorbed by the pipeline,
/// which continues with the pre-stage buffer and records the skip in
/// the [`RunReport`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input byte slice was empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The source bytes could not be decoded as an image.
    #[error("failed to decode image: {0}")]
    Decode(#[source] EngineError),

    /// A stage failed in a way declared pipeline-fatal.
    #[error("stage {stage} failed: {error}")]
    Stage {
        /// The stage that failed.
        stage: StageKind,
        /// The underlying stage error.
        error: StageError,
    },

    /// A stage returned success but the accepted buffer is invalid.
    ///
    /// Stages validate their own output, so reaching this guard means a
    /// stage implementation broke its contract.
    #[error("invalid live buffer after stage {0}")]
    CorruptBuffer(StageKind),

    /// The final downscale or encode failed.
    #[error("failed to encode output image: {0}")]
    Encode(#[source] EngineError),

    /// `step()` was called on a machine already in a terminal state.
    #[error("pipeline already reached a terminal state")]
    InvalidState,
}
