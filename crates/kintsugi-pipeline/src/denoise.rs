//! Denoise stage: grain and sensor-noise reduction.
//!
//! The preferred primitive is color-aware non-local-means. Engines
//! without it fall back (at profile-selection time, not per call) to
//! grayscale-domain denoising re-composited to color, and finally to a
//! plain Gaussian blur with a kernel size derived from strength.

use crate::buffer::ImageBuffer;
use crate::engine::Engine;
use crate::profile::{CapabilityProfile, DenoiseVariant};
use crate::stage::{FilterStage, StageFailure, StageKind, accept_output};
use crate::types::DenoiseSettings;

/// Grain reduction over the whole image.
#[derive(Debug, Clone, Copy)]
pub struct Denoise {
    settings: DenoiseSettings,
}

impl Denoise {
    /// Create the stage; strength is clamped to 0–100.
    #[must_use]
    pub fn new(mut settings: DenoiseSettings) -> Self {
        settings.strength = settings.strength.min(100);
        Self { settings }
    }

    /// Map strength 0–100 linearly onto the bounded smoothing parameter
    /// 0–10 shared by the denoise primitives.
    #[must_use]
    pub fn smoothing(strength: u8) -> f32 {
        f32::from(strength.min(100)) / 10.0
    }

    /// Odd Gaussian kernel size derived from strength, for the blur
    /// fallback. Grows from 1 (no-op) at strength 0 to 11 at 100.
    #[must_use]
    pub const fn blur_kernel_size(strength: u8) -> u32 {
        let strength = if strength > 100 { 100 } else { strength };
        (strength as u32 / 20) * 2 + 1
    }
}

impl FilterStage for Denoise {
    fn kind(&self) -> StageKind {
        StageKind::Denoise
    }

    fn apply(
        &self,
        engine: &dyn Engine,
        profile: &CapabilityProfile,
        input: ImageBuffer,
    ) -> Result<ImageBuffer, StageFailure> {
        if self.settings.strength == 0 {
            return Ok(input);
        }

        let smoothing = Self::smoothing(self.settings.strength);
        let result = match profile.denoise {
            DenoiseVariant::ColorNonLocalMeans => engine.denoise_color(&input, smoothing),
            DenoiseVariant::LuminanceRecombined => engine.denoise_luminance(&input, smoothing),
            DenoiseVariant::GaussianBlur => {
                engine.gaussian_blur(&input, Self::blur_kernel_size(self.settings.strength))
            }
        };

        match result {
            Ok(output) => accept_output(input, output),
            Err(error) => Err(StageFailure::new(input, error)),
        }
    }
}
