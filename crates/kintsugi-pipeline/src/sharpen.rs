//! Sharpen stage: unsharp-mask style edge enhancement.
//!
//! Uses a fixed 3×3 kernel whose center weight is `1 + strength/100 *
//! boost` and whose eight neighbors share the negative of that boost
//! equally, so the kernel sums to exactly 1 and sharpening never
//! shifts overall brightness.
//!
//! A dimension change in the convolution output is the one stage
//! failure that is fatal to the whole run.

use crate::buffer::ImageBuffer;
use crate::engine::Engine;
use crate::profile::CapabilityProfile;
use crate::stage::{FilterStage, StageError, StageFailure, StageKind, accept_output};
use crate::types::SharpenSettings;

/// Edge enhancement via 3×3 convolution.
#[derive(Debug, Clone, Copy)]
pub struct Sharpen {
    settings: SharpenSettings,
}

impl Sharpen {
    /// Create the stage; strength is clamped to 0–100.
    #[must_use]
    pub fn new(mut settings: SharpenSettings) -> Self {
        settings.strength = settings.strength.min(100);
        Self { settings }
    }

    /// Build the sharpening kernel for a given strength and boost.
    ///
    /// Row-major 3×3; sums to 1 for every strength in 0–100.
    #[must_use]
    pub fn kernel(strength: u8, boost: f32) -> [f32; 9] {
        let gain = f32::from(strength.min(100)) / 100.0 * boost;
        let neighbor = -gain / 8.0;
        let mut kernel = [neighbor; 9];
        kernel[4] = 1.0 + gain;
        kernel
    }
}

impl FilterStage for Sharpen {
    fn kind(&self) -> StageKind {
        StageKind::Sharpen
    }

    fn apply(
        &self,
        engine: &dyn Engine,
        _profile: &CapabilityProfile,
        input: ImageBuffer,
    ) -> Result<ImageBuffer, StageFailure> {
        if self.settings.strength == 0 {
            return Ok(input);
        }

        let kernel = Self::kernel(self.settings.strength, self.settings.boost);
        let output = match engine.convolve3x3(&input, &kernel) {
            Ok(output) => output,
            Err(error) => return Err(StageFailure::new(input, error)),
        };

        if (output.width(), output.height()) != (input.width(), input.height()) {
            let error = StageError::DimensionMismatch {
                expected_width: input.width(),
                expected_height: input.height(),
                actual_width: output.width(),
                actual_height: output.height(),
            };
            return Err(StageFailure::new(input, error));
        }

        accept_output(input, output)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bundled::BundledEngine;
    use crate::types::RgbaImage;

    fn edge_buffer(width: u32, height: u32) -> ImageBuffer {
        let img = RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                image::Rgba([60, 60, 60, 255])
            } else {
                image::Rgba([190, 190, 190, 255])
            }
        });
        ImageBuffer::from_image(img)
    }

    #[test]
    fn kernel_sums_to_one_for_all_strengths() {
        for strength in [0, 1, 25, 37, 50, 99, 100] {
            let kernel = Sharpen::kernel(strength, 0.5);
            let sum: f32 = kernel.iter().sum();
            assert!(
                (sum - 1.0).abs() < 1e-5,
                "kernel sum for strength {strength} was {sum}",
            );
        }
    }

    #[test]
    fn kernel_center_grows_with_strength() {
        let weak = Sharpen::kernel(10, 0.5)[4];
        let strong = Sharpen::kernel(90, 0.5)[4];
        assert!(strong > weak);
        assert!((Sharpen::kernel(0, 0.5)[4] - 1.0).abs() < f32::EPSILON);
        assert!((Sharpen::kernel(100, 0.5)[4] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_strength_is_clamped() {
        assert_eq!(Sharpen::kernel(255, 0.5), Sharpen::kernel(100, 0.5));
    }

    #[test]
    fn output_dimensions_match_input() {
        let engine = BundledEngine::new();
        let profile = CapabilityProfile::detect(&engine);
        let stage = Sharpen::new(SharpenSettings::default());

        let output = stage.apply(&engine, &profile, edge_buffer(21, 9)).unwrap();
        assert_eq!(output.width(), 21);
        assert_eq!(output.height(), 9);
    }

    #[test]
    fn zero_strength_passes_input_through() {
        let engine = BundledEngine::new();
        let profile = CapabilityProfile::detect(&engine);
        let stage = Sharpen::new(SharpenSettings {
            enabled: true,
            strength: 0,
            boost: 0.5,
        });

        let input = edge_buffer(8, 8);
        let before = input.as_image().clone();
        let output = stage.apply(&engine, &profile, input).unwrap();
        assert_eq!(output.as_image(), &before);
    }

    #[test]
    fn sharpening_steepens_the_edge() {
        let engine = BundledEngine::new();
        let profile = CapabilityProfile::detect(&engine);
        let stage = Sharpen::new(SharpenSettings {
            enabled: true,
            strength: 100,
            boost: 0.5,
        });

        let input = edge_buffer(16, 8);
        let output = stage.apply(&engine, &profile, input).unwrap();

        // Just left of the boundary the sharpened image should be
        // darker than the flat input value (overshoot), or at minimum
        // not brighter; just right, not darker.
        let left = output.as_image().get_pixel(6, 4).0[0];
        let right = output.as_image().get_pixel(8, 4).0[0];
        assert!(left <= 60, "expected overshoot at dark side, got {left}");
        assert!(right >= 190, "expected overshoot at bright side, got {right}");
    }
}
