//! Auto-contrast stage: global contrast/brightness normalization.
//!
//! Equalizes the luminance channel, then recombines with the original
//! color image at a fixed blend (70% original / 30% equalized at the
//! default strength). Full equalization on old photographs produces
//! harsh, posterized results; the partial blend is the reference
//! behavior, kept as a configurable default.
//!
//! Any internal failure restores the pre-stage buffer -- this stage is
//! never fatal to a run.

use crate::buffer::ImageBuffer;
use crate::engine::Engine;
use crate::profile::CapabilityProfile;
use crate::stage::{FilterStage, StageError, StageFailure, StageKind, accept_output};
use crate::types::{ContrastSettings, GrayImage, RgbaImage};

/// Histogram-equalization contrast recovery with partial blending.
#[derive(Debug, Clone, Copy)]
pub struct AutoContrast {
    settings: ContrastSettings,
}

impl AutoContrast {
    /// Create the stage; strength is clamped to 0–100 and the blend
    /// constant to 0–1.
    #[must_use]
    pub fn new(mut settings: ContrastSettings) -> Self {
        settings.strength = settings.strength.min(100);
        settings.blend = settings.blend.clamp(0.0, 1.0);
        Self { settings }
    }

    /// The equalized-luminance fraction actually mixed in: the
    /// configured blend scaled linearly by strength, with strength 50
    /// reproducing the blend constant exactly.
    #[must_use]
    pub fn effective_blend(&self) -> f32 {
        (self.settings.blend * f32::from(self.settings.strength) / 50.0).clamp(0.0, 1.0)
    }
}

impl FilterStage for AutoContrast {
    fn kind(&self) -> StageKind {
        StageKind::AutoContrast
    }

    fn apply(
        &self,
        engine: &dyn Engine,
        _profile: &CapabilityProfile,
        input: ImageBuffer,
    ) -> Result<ImageBuffer, StageFailure> {
        let blend = self.effective_blend();
        if blend <= 0.0 {
            return Ok(input);
        }

        let equalized = match engine.equalize_luminance(&input) {
            Ok(plane) => plane,
            Err(error) => return Err(StageFailure::new(input, error)),
        };

        if equalized.dimensions() != (input.width(), input.height()) {
            return Err(StageFailure::new(
                input,
                StageError::Internal("equalized luminance plane has mismatched dimensions".into()),
            ));
        }

        let blended = blend_equalized(input.as_image(), &equalized, blend);
        accept_output(input, ImageBuffer::from_image(blended))
    }
}

/// Mix each color channel toward the equalized luminance value.
///
/// `out = (1 - blend) * channel + blend * equalized`, alpha preserved.
fn blend_equalized(original: &RgbaImage, equalized: &GrayImage, blend: f32) -> RgbaImage {
    let keep = 1.0 - blend;
    RgbaImage::from_fn(original.width(), original.height(), |x, y| {
        let pixel = original.get_pixel(x, y).0;
        let target = f32::from(equalized.get_pixel(x, y).0[0]);
        let mix = |channel: u8| -> u8 {
            let value = f32::from(channel).mul_add(keep, target * blend);
            value.round().clamp(0.0, 255.0) as u8
        };
        image::Rgba([mix(pixel[0]), mix(pixel[1]), mix(pixel[2]), pixel[3]])
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation)]
mod tests {
    use super::*;
    use crate::bundled::BundledEngine;

    fn gradient_buffer(width: u32, height: u32) -> ImageBuffer {
        // Low-contrast gradient confined to a narrow band of values.
        let img = RgbaImage::from_fn(width, height, |x, _| {
            let v = 100 + (x * 40 / width.max(1)) as u8;
            image::Rgba([v, v, v, 255])
        });
        ImageBuffer::from_image(img)
    }

    #[test]
    fn default_strength_reproduces_reference_blend() {
        let stage = AutoContrast::new(ContrastSettings::default());
        assert!((stage.effective_blend() - 0.30).abs() < 1e-6);
    }

    #[test]
    fn effective_blend_never_exceeds_one() {
        let stage = AutoContrast::new(ContrastSettings {
            enabled: true,
            strength: 100,
            blend: 0.9,
        });
        assert!(stage.effective_blend() <= 1.0);
    }

    #[test]
    fn zero_strength_passes_input_through() {
        let engine = BundledEngine::new();
        let profile = CapabilityProfile::detect(&engine);
        let stage = AutoContrast::new(ContrastSettings {
            enabled: true,
            strength: 0,
            blend: 0.30,
        });

        let input = gradient_buffer(10, 10);
        let before = input.as_image().clone();
        let output = stage.apply(&engine, &profile, input).unwrap();
        assert_eq!(output.as_image(), &before);
    }

    #[test]
    fn output_dimensions_match_input() {
        let engine = BundledEngine::new();
        let profile = CapabilityProfile::detect(&engine);
        let stage = AutoContrast::new(ContrastSettings::default());

        let output = stage.apply(&engine, &profile, gradient_buffer(19, 7)).unwrap();
        assert_eq!(output.width(), 19);
        assert_eq!(output.height(), 7);
    }

    #[test]
    fn contrast_widens_a_narrow_histogram() {
        let engine = BundledEngine::new();
        let profile = CapabilityProfile::detect(&engine);
        let stage = AutoContrast::new(ContrastSettings::default());

        let output = stage
            .apply(&engine, &profile, gradient_buffer(32, 8))
            .unwrap();

        let (mut min, mut max) = (255_u8, 0_u8);
        for pixel in output.as_image().pixels() {
            min = min.min(pixel.0[0]);
            max = max.max(pixel.0[0]);
        }
        // Input values span 100..140; equalization pushed toward a
        // wider range even after the 70/30 blend.
        assert!(
            max - min > 40,
            "expected widened value range, got {min}..{max}",
        );
    }

    #[test]
    fn full_blend_matches_equalized_plane() {
        let engine = BundledEngine::new();
        let input = gradient_buffer(16, 4);
        let equalized = engine.equalize_luminance(&input).unwrap();
        let blended = blend_equalized(input.as_image(), &equalized, 1.0);
        for (x, y, pixel) in blended.enumerate_pixels() {
            assert_eq!(pixel.0[0], equalized.get_pixel(x, y).0[0]);
        }
    }
}
