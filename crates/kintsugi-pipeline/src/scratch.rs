//! Scratch-repair stage: detect and fill scratch-like defects.
//!
//! Scratches on scanned photographs read as thin high-gradient lines.
//! The stage finds them with edge detection (thresholds derived from
//! strength within a bounded practical range), connects fragments with
//! morphological dilation, and inpaints the masked regions from
//! surrounding context. Engines without an inpainting primitive use a
//! whole-image median filter as a coarse substitute, selected once at
//! profile time.
//!
//! This is the most failure-prone stage (inpainting artifacts on busy
//! images); any failure degrades to passing the input through
//! unchanged and never aborts the run.

use crate::buffer::ImageBuffer;
use crate::engine::{Engine, EngineError};
use crate::profile::{CapabilityProfile, ScratchVariant};
use crate::stage::{FilterStage, StageFailure, StageKind, accept_output};
use crate::types::ScratchSettings;

/// Dilation kernel radius used to connect scratch fragments.
const DILATE_RADIUS: u8 = 1;

/// Dilation passes over the scratch mask.
const DILATE_ITERATIONS: u32 = 2;

/// Context radius handed to the inpainting primitive.
const INPAINT_RADIUS: u32 = 3;

/// Median window radius for the fallback path.
const MEDIAN_RADIUS: u32 = 2;

/// Scratch detection and repair.
#[derive(Debug, Clone, Copy)]
pub struct ScratchRepair {
    settings: ScratchSettings,
}

impl ScratchRepair {
    /// Create the stage; strength is clamped to 0–100.
    #[must_use]
    pub fn new(mut settings: ScratchSettings) -> Self {
        settings.strength = settings.strength.min(100);
        Self { settings }
    }

    /// Edge-detection thresholds derived from strength.
    ///
    /// Higher strength lowers the high threshold (150 down to 50) so
    /// fainter scratches are caught; the low threshold tracks at half
    /// the high. Both stay inside a bounded practical range for any
    /// strength.
    #[must_use]
    pub fn thresholds(strength: u8) -> (f32, f32) {
        let high = 150.0 - f32::from(strength.min(100));
        (high * 0.5, high)
    }

    fn run_variant(
        &self,
        engine: &dyn Engine,
        variant: ScratchVariant,
        input: &ImageBuffer,
    ) -> Result<ImageBuffer, EngineError> {
        match variant {
            ScratchVariant::Inpaint => {
                let (low, high) = Self::thresholds(self.settings.strength);
                let mask = engine.detect_edges(input, low, high)?;
                let mask = engine.dilate(&mask, DILATE_RADIUS, DILATE_ITERATIONS)?;
                engine.inpaint(input, &mask, INPAINT_RADIUS)
            }
            ScratchVariant::MedianFilter => engine.median_filter(input, MEDIAN_RADIUS),
        }
    }
}

impl FilterStage for ScratchRepair {
    fn kind(&self) -> StageKind {
        StageKind::ScratchRepair
    }

    fn apply(
        &self,
        engine: &dyn Engine,
        profile: &CapabilityProfile,
        input: ImageBuffer,
    ) -> Result<ImageBuffer, StageFailure> {
        match self.run_variant(engine, profile.scratch, &input) {
            Ok(output) => accept_output(input, output),
            Err(error) => Err(StageFailure::new(input, error)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bundled::BundledEngine;
    use crate::engine::Capabilities;
    use crate::types::{GrayImage, OutputFormat, RgbaImage};

    /// Buffer with a bright thin vertical line on a mid-gray field --
    /// the scratch shape the stage is built for.
    fn scratched_buffer(width: u32, height: u32) -> ImageBuffer {
        let img = RgbaImage::from_fn(width, height, |x, _| {
            if x == width / 2 {
                image::Rgba([250, 250, 250, 255])
            } else {
                image::Rgba([120, 110, 100, 255])
            }
        });
        ImageBuffer::from_image(img)
    }

    /// Delegates everything to the bundled engine but declares no
    /// inpainting primitive.
    struct NoInpaintEngine(BundledEngine);

    impl Engine for NoInpaintEngine {
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                inpaint: false,
                ..self.0.capabilities()
            }
        }
        fn decode(&self, bytes: &[u8]) -> Result<ImageBuffer, EngineError> {
            self.0.decode(bytes)
        }
        fn denoise_color(&self, i: &ImageBuffer, s: f32) -> Result<ImageBuffer, EngineError> {
            self.0.denoise_color(i, s)
        }
        fn denoise_luminance(&self, i: &ImageBuffer, s: f32) -> Result<ImageBuffer, EngineError> {
            self.0.denoise_luminance(i, s)
        }
        fn gaussian_blur(&self, i: &ImageBuffer, k: u32) -> Result<ImageBuffer, EngineError> {
            self.0.gaussian_blur(i, k)
        }
        fn equalize_luminance(&self, i: &ImageBuffer) -> Result<GrayImage, EngineError> {
            self.0.equalize_luminance(i)
        }
        fn convolve3x3(&self, i: &ImageBuffer, k: &[f32; 9]) -> Result<ImageBuffer, EngineError> {
            self.0.convolve3x3(i, k)
        }
        fn detect_edges(
            &self,
            i: &ImageBuffer,
            low: f32,
            high: f32,
        ) -> Result<GrayImage, EngineError> {
            self.0.detect_edges(i, low, high)
        }
        fn dilate(&self, m: &GrayImage, r: u8, n: u32) -> Result<GrayImage, EngineError> {
            self.0.dilate(m, r, n)
        }
        fn inpaint(
            &self,
            _input: &ImageBuffer,
            _mask: &GrayImage,
            _radius: u32,
        ) -> Result<ImageBuffer, EngineError> {
            Err(EngineError::Unsupported("inpaint"))
        }
        fn median_filter(&self, i: &ImageBuffer, r: u32) -> Result<ImageBuffer, EngineError> {
            self.0.median_filter(i, r)
        }
        fn resize(&self, i: &ImageBuffer, w: u32, h: u32) -> Result<ImageBuffer, EngineError> {
            self.0.resize(i, w, h)
        }
        fn encode(
            &self,
            i: &ImageBuffer,
            f: OutputFormat,
            q: u8,
        ) -> Result<Vec<u8>, EngineError> {
            self.0.encode(i, f, q)
        }
    }

    #[test]
    fn thresholds_stay_in_practical_range() {
        let (low0, high0) = ScratchRepair::thresholds(0);
        let (low100, high100) = ScratchRepair::thresholds(100);
        assert!((high0 - 150.0).abs() < f32::EPSILON);
        assert!((high100 - 50.0).abs() < f32::EPSILON);
        assert!(low0 < high0 && low100 < high100);
        assert!(low100 >= 1.0, "low threshold must stay positive");
        // Clamp, don't grow, past 100.
        assert_eq!(
            ScratchRepair::thresholds(200),
            ScratchRepair::thresholds(100)
        );
    }

    #[test]
    fn inpaint_variant_softens_the_scratch() {
        let engine = BundledEngine::new();
        let profile = CapabilityProfile::detect(&engine);
        assert_eq!(profile.scratch, ScratchVariant::Inpaint);

        let stage = ScratchRepair::new(ScratchSettings {
            enabled: true,
            strength: 70,
        });
        let output = stage
            .apply(&engine, &profile, scratched_buffer(31, 15))
            .unwrap();
        assert_eq!((output.width(), output.height()), (31, 15));

        // The bright scratch column should have moved toward the
        // surrounding field.
        let repaired = output.as_image().get_pixel(15, 7).0[0];
        assert!(
            repaired < 250,
            "scratch pixel should be filled from context, got {repaired}",
        );
    }

    #[test]
    fn median_fallback_still_produces_valid_output() {
        let engine = NoInpaintEngine(BundledEngine::new());
        let profile = CapabilityProfile::detect(&engine);
        assert_eq!(profile.scratch, ScratchVariant::MedianFilter);

        let stage = ScratchRepair::new(ScratchSettings {
            enabled: true,
            strength: 50,
        });
        let output = stage
            .apply(&engine, &profile, scratched_buffer(21, 11))
            .unwrap();
        assert!(output.is_valid());
        assert_eq!((output.width(), output.height()), (21, 11));
    }

    #[test]
    fn unsupported_primitive_returns_input_unchanged() {
        // Force the inpaint variant against an engine without it: the
        // failure must hand the original buffer back.
        let engine = NoInpaintEngine(BundledEngine::new());
        let profile = CapabilityProfile {
            scratch: ScratchVariant::Inpaint,
            ..CapabilityProfile::detect(&engine)
        };

        let stage = ScratchRepair::new(ScratchSettings::default());
        let input = scratched_buffer(9, 9);
        let before = input.as_image().clone();
        let failure = stage.apply(&engine, &profile, input).unwrap_err();
        assert!(!failure.error.is_fatal());
        assert_eq!(failure.input.as_image(), &before);
    }
}
