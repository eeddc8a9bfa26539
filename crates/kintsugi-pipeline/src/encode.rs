//! Final downscale clamp and output encoding.
//!
//! Very large scans make the encode step (and the buffers feeding it)
//! disproportionately expensive, so before serializing, the pipeline
//! uniformly downscales any image whose longest axis exceeds
//! [`MAX_OUTPUT_DIMENSION`]. Encoding itself is delegated to the
//! engine's `encode` primitive.

use crate::buffer::ImageBuffer;
use crate::engine::Engine;
use crate::types::{OutputSettings, PipelineError};

/// Largest output axis, in pixels. Larger images are uniformly
/// downscaled before encode.
pub const MAX_OUTPUT_DIMENSION: u32 = 4096;

/// Clamp the buffer so its longest axis is at most `max_dimension`,
/// preserving aspect ratio. Returns the (possibly unchanged) buffer and
/// whether a downscale was applied.
///
/// # Errors
///
/// Returns [`PipelineError::Encode`] if the resize primitive fails.
pub fn clamp_dimensions(
    engine: &dyn Engine,
    buffer: ImageBuffer,
    max_dimension: u32,
) -> Result<(ImageBuffer, bool), PipelineError> {
    let (width, height) = (buffer.width(), buffer.height());
    let long_axis = width.max(height);
    if long_axis <= max_dimension {
        return Ok((buffer, false));
    }

    let scale = f64::from(max_dimension) / f64::from(long_axis);
    let target_width = scaled_axis(width, scale);
    let target_height = scaled_axis(height, scale);

    let resized = engine
        .resize(&buffer, target_width, target_height)
        .map_err(PipelineError::Encode)?;
    Ok((resized, true))
}

/// Scale one axis, rounding to nearest and never collapsing to zero.
fn scaled_axis(axis: u32, scale: f64) -> u32 {
    let scaled = (f64::from(axis) * scale).round();
    if scaled < 1.0 { 1 } else { scaled as u32 }
}

/// Encode the buffer with the engine, applying the clamped quality.
///
/// # Errors
///
/// Returns [`PipelineError::Encode`] if serialization fails.
pub fn encode_output(
    engine: &dyn Engine,
    buffer: &ImageBuffer,
    output: OutputSettings,
) -> Result<Vec<u8>, PipelineError> {
    engine
        .encode(buffer, output.format, output.quality.clamp(50, 100))
        .map_err(PipelineError::Encode)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bundled::BundledEngine;
    use crate::types::{OutputFormat, RgbaImage};

    fn flat_buffer(width: u32, height: u32) -> ImageBuffer {
        ImageBuffer::from_image(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([90, 120, 150, 255]),
        ))
    }

    #[test]
    fn small_image_is_untouched() {
        let engine = BundledEngine::new();
        let (buffer, downscaled) = clamp_dimensions(&engine, flat_buffer(640, 480), 4096).unwrap();
        assert!(!downscaled);
        assert_eq!((buffer.width(), buffer.height()), (640, 480));
    }

    #[test]
    fn wide_image_clamps_long_axis_exactly() {
        let engine = BundledEngine::new();
        // Keep the test cheap by clamping to a small maximum.
        let (buffer, downscaled) = clamp_dimensions(&engine, flat_buffer(500, 10), 100).unwrap();
        assert!(downscaled);
        assert_eq!(buffer.width(), 100);
        assert_eq!(buffer.height(), 2);
    }

    #[test]
    fn tall_image_clamps_long_axis_exactly() {
        let engine = BundledEngine::new();
        let (buffer, downscaled) = clamp_dimensions(&engine, flat_buffer(8, 300), 150).unwrap();
        assert!(downscaled);
        assert_eq!(buffer.width(), 4);
        assert_eq!(buffer.height(), 150);
    }

    #[test]
    fn short_axis_never_collapses_to_zero() {
        let engine = BundledEngine::new();
        let (buffer, _) = clamp_dimensions(&engine, flat_buffer(4000, 1), 100).unwrap();
        assert_eq!(buffer.height(), 1);
        assert_eq!(buffer.width(), 100);
    }

    #[test]
    fn encode_produces_decodable_png() {
        let engine = BundledEngine::new();
        let buffer = flat_buffer(12, 7);
        let bytes = encode_output(
            &engine,
            &buffer,
            crate::types::OutputSettings {
                format: OutputFormat::Png,
                quality: 90,
            },
        )
        .unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 7));
    }
}
