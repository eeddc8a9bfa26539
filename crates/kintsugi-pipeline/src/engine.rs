//! Capability interface to the external image-processing engine.
//!
//! The pipeline never calls a vision library directly. Every filter
//! primitive it needs -- decode, denoise, equalization, convolution,
//! edge detection, dilation, inpainting, resize, encode -- is consumed
//! through the [`Engine`] trait, and an engine declares which optional
//! primitives it actually provides via [`Capabilities`]. Variant
//! selection from those capabilities happens once, at load time, in
//! [`CapabilityProfile`](crate::profile::CapabilityProfile) -- stages do
//! not re-probe per call.

use crate::buffer::ImageBuffer;
use crate::types::{GrayImage, OutputFormat};

/// Optional primitives an engine may or may not provide.
///
/// The always-required primitives (decode, blur, equalize, convolve,
/// edges, dilate, median, resize, encode) have no flags: an engine that
/// cannot supply those is not usable as an engine at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Color-aware non-local-means denoising.
    pub denoise_color: bool,
    /// Grayscale-domain denoising, re-composited to color through the
    /// luminance channel.
    pub denoise_luminance: bool,
    /// Context-aware inpainting of masked regions.
    pub inpaint: bool,
}

/// Errors surfaced by engine primitives.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The primitive is not provided by this engine.
    ///
    /// Reaching this from the pipeline indicates a capability-profile
    /// bug: profiles are built so that unsupported primitives are never
    /// selected.
    #[error("primitive `{0}` is not provided by this engine")]
    Unsupported(&'static str),

    /// An underlying image operation failed.
    #[error("image operation failed: {0}")]
    Image(#[from] image::ImageError),

    /// The primitive ran but produced unusable output.
    #[error("{0}")]
    Malformed(String),
}

/// The image-processing capability consumed by the pipeline.
///
/// Primitives borrow their input and return a *new* buffer; buffer
/// lifecycle (who owns what, and when the input is released) is the
/// stage's responsibility, not the engine's.
pub trait Engine: Send + Sync {
    /// Which optional primitives this engine provides.
    fn capabilities(&self) -> Capabilities;

    /// Decode raw image bytes (PNG, JPEG, BMP, WebP) into an RGBA buffer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Image`] if the bytes are not a decodable
    /// image.
    fn decode(&self, bytes: &[u8]) -> Result<ImageBuffer, EngineError>;

    /// Color-aware non-local-means denoise. `strength` is the bounded
    /// smoothing parameter, 0–10.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unsupported`] when
    /// [`Capabilities::denoise_color`] is `false`.
    fn denoise_color(&self, input: &ImageBuffer, strength: f32) -> Result<ImageBuffer, EngineError>;

    /// Grayscale-domain denoise applied to the luminance channel and
    /// re-composited to color. `strength` is the bounded smoothing
    /// parameter, 0–10.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unsupported`] when
    /// [`Capabilities::denoise_luminance`] is `false`.
    fn denoise_luminance(
        &self,
        input: &ImageBuffer,
        strength: f32,
    ) -> Result<ImageBuffer, EngineError>;

    /// Gaussian blur with an odd `kernel_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if the blur cannot be applied.
    fn gaussian_blur(&self, input: &ImageBuffer, kernel_size: u32)
    -> Result<ImageBuffer, EngineError>;

    /// Histogram-equalize the luminance channel, returning the equalized
    /// single-channel plane.
    ///
    /// # Errors
    ///
    /// Returns an error if the plane cannot be produced.
    fn equalize_luminance(&self, input: &ImageBuffer) -> Result<GrayImage, EngineError>;

    /// Convolve with a 3×3 kernel (row-major).
    ///
    /// # Errors
    ///
    /// Returns an error if the convolution fails.
    fn convolve3x3(&self, input: &ImageBuffer, kernel: &[f32; 9])
    -> Result<ImageBuffer, EngineError>;

    /// Detect edges, returning a binary mask (255 = edge).
    ///
    /// # Errors
    ///
    /// Returns an error if detection fails.
    fn detect_edges(
        &self,
        input: &ImageBuffer,
        low_threshold: f32,
        high_threshold: f32,
    ) -> Result<GrayImage, EngineError>;

    /// Morphologically dilate a binary mask `iterations` times with the
    /// given kernel radius.
    ///
    /// # Errors
    ///
    /// Returns an error if dilation fails.
    fn dilate(
        &self,
        mask: &GrayImage,
        kernel_radius: u8,
        iterations: u32,
    ) -> Result<GrayImage, EngineError>;

    /// Inpaint the masked regions (mask value > 0) from surrounding
    /// context, looking `radius` pixels around each unknown pixel.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unsupported`] when
    /// [`Capabilities::inpaint`] is `false`, or
    /// [`EngineError::Malformed`] if the mask dimensions do not match
    /// the input.
    fn inpaint(
        &self,
        input: &ImageBuffer,
        mask: &GrayImage,
        radius: u32,
    ) -> Result<ImageBuffer, EngineError>;

    /// Median-filter the whole image with the given radius.
    ///
    /// # Errors
    ///
    /// Returns an error if filtering fails.
    fn median_filter(&self, input: &ImageBuffer, radius: u32) -> Result<ImageBuffer, EngineError>;

    /// Resample to exactly `width` × `height`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Malformed`] if either target dimension is
    /// zero.
    fn resize(&self, input: &ImageBuffer, width: u32, height: u32)
    -> Result<ImageBuffer, EngineError>;

    /// Serialize the buffer to the requested format. `quality` (50–100)
    /// applies to lossy formats only.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Image`] if encoding fails.
    fn encode(
        &self,
        input: &ImageBuffer,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, EngineError>;
}
