//! Input validation: files are rejected before a task is ever created.
//!
//! Checks run in cheap-to-expensive order: queue capacity, size
//! ceiling, then a content sniff of the image magic bytes (file
//! extensions are not trusted).

use serde::{Deserialize, Serialize};

/// Queue-level acceptance limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueLimits {
    /// Maximum number of tasks held by the queue at once.
    pub max_tasks: usize,
    /// Maximum accepted source file size, in bytes.
    pub max_file_bytes: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_tasks: 5,
            max_file_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Why a file was rejected at the queue boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The bytes do not start with a recognized image signature.
    #[error("file is not a recognized image format")]
    NotAnImage,

    /// The file exceeds the size ceiling.
    #[error("file is {size} bytes, over the {limit}-byte ceiling")]
    TooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Configured ceiling in bytes.
        limit: usize,
    },

    /// The queue already holds the maximum number of tasks.
    #[error("queue already holds the maximum of {limit} tasks")]
    QueueFull {
        /// Configured task limit.
        limit: usize,
    },
}

/// Validate a candidate source file against the queue limits.
///
/// # Errors
///
/// Returns the first failed check; see [`ValidationError`].
pub fn validate_source(
    bytes: &[u8],
    current_tasks: usize,
    limits: &QueueLimits,
) -> Result<(), ValidationError> {
    if current_tasks >= limits.max_tasks {
        return Err(ValidationError::QueueFull {
            limit: limits.max_tasks,
        });
    }
    if bytes.len() > limits.max_file_bytes {
        return Err(ValidationError::TooLarge {
            size: bytes.len(),
            limit: limits.max_file_bytes,
        });
    }
    if image::guess_format(bytes).is_err() {
        return Err(ValidationError::NotAnImage);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn valid_png_is_accepted() {
        assert!(validate_source(&tiny_png(), 0, &QueueLimits::default()).is_ok());
    }

    #[test]
    fn text_bytes_are_rejected() {
        let result = validate_source(b"definitely not an image", 0, &QueueLimits::default());
        assert_eq!(result, Err(ValidationError::NotAnImage));
    }

    #[test]
    fn empty_bytes_are_rejected() {
        assert_eq!(
            validate_source(&[], 0, &QueueLimits::default()),
            Err(ValidationError::NotAnImage),
        );
    }

    #[test]
    fn oversize_file_is_rejected_before_sniffing() {
        let limits = QueueLimits {
            max_file_bytes: 16,
            ..QueueLimits::default()
        };
        let png = tiny_png();
        let result = validate_source(&png, 0, &limits);
        assert_eq!(
            result,
            Err(ValidationError::TooLarge {
                size: png.len(),
                limit: 16,
            }),
        );
    }

    #[test]
    fn full_queue_rejects_even_valid_files() {
        let limits = QueueLimits::default();
        let result = validate_source(&tiny_png(), limits.max_tasks, &limits);
        assert_eq!(result, Err(ValidationError::QueueFull { limit: 5 }));
    }

    #[test]
    fn default_limits_match_reference_behavior() {
        let limits = QueueLimits::default();
        assert_eq!(limits.max_tasks, 5);
        assert_eq!(limits.max_file_bytes, 50 * 1024 * 1024);
    }
}
