//! The bundled image-processing engine, backed by `image`/`imageproc`.
//!
//! This is the engine the default capability loader ships. It provides
//! every primitive the pipeline needs except color non-local-means
//! denoising, which `imageproc` has no equivalent for -- the capability
//! is declared absent and profile selection picks the luminance
//! fallback instead of probing at call time.
//!
//! Several `imageproc` filters operate on single-channel images only,
//! so color variants split the RGBA image into planes, process each,
//! and reassemble.

use image::Luma;
use imageproc::distance_transform::Norm;

use crate::buffer::ImageBuffer;
use crate::engine::{Capabilities, Engine, EngineError};
use crate::types::{GrayImage, OutputFormat, RgbaImage};

/// Minimum allowed edge-detection threshold.
///
/// A zero low threshold turns every gradient pixel into a candidate
/// edge, producing a dense mask that swamps dilation and inpainting.
const MIN_EDGE_THRESHOLD: f32 = 1.0;

/// Spatial window radius for the bilateral luminance denoise.
const BILATERAL_RADIUS: u32 = 3;

/// The engine bundled with this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledEngine;

impl BundledEngine {
    /// Create the bundled engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Engine for BundledEngine {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            denoise_color: false,
            denoise_luminance: true,
            inpaint: true,
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<ImageBuffer, EngineError> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(ImageBuffer::from_image(decoded.to_rgba8()))
    }

    fn denoise_color(
        &self,
        _input: &ImageBuffer,
        _strength: f32,
    ) -> Result<ImageBuffer, EngineError> {
        Err(EngineError::Unsupported("color non-local-means denoise"))
    }

    fn denoise_luminance(
        &self,
        input: &ImageBuffer,
        strength: f32,
    ) -> Result<ImageBuffer, EngineError> {
        let strength = strength.clamp(0.0, 10.0);
        let luma = luminance_plane(input.as_image());
        // Range sigma 10–100: strength 0 barely smooths, 10 flattens
        // everything short of strong edges.
        let range_sigma = strength.mul_add(9.0, 10.0);
        let smoothed = bilateral_gray(&luma, BILATERAL_RADIUS, range_sigma);
        Ok(ImageBuffer::from_image(recombine_luminance(
            input.as_image(),
            &luma,
            &smoothed,
        )))
    }

    fn gaussian_blur(
        &self,
        input: &ImageBuffer,
        kernel_size: u32,
    ) -> Result<ImageBuffer, EngineError> {
        if kernel_size <= 1 {
            return Ok(ImageBuffer::from_image(input.as_image().clone()));
        }
        // Sigma derived from the odd kernel size the caller chose
        // (matches the conventional ksize-to-sigma mapping).
        let half = (kernel_size.saturating_sub(1)) / 2;
        let sigma = (f32::from(u16::try_from(half).unwrap_or(u16::MAX)) - 1.0)
            .mul_add(0.3, 0.8)
            .max(0.1);
        Ok(ImageBuffer::from_image(gaussian_blur_rgba(
            input.as_image(),
            sigma,
        )))
    }

    fn equalize_luminance(&self, input: &ImageBuffer) -> Result<GrayImage, EngineError> {
        let luma = luminance_plane(input.as_image());
        Ok(imageproc::contrast::equalize_histogram(&luma))
    }

    fn convolve3x3(
        &self,
        input: &ImageBuffer,
        kernel: &[f32; 9],
    ) -> Result<ImageBuffer, EngineError> {
        let output: RgbaImage = imageproc::filter::filter_clamped::<_, f32, u8>(
            input.as_image(),
            imageproc::kernel::Kernel::new(kernel, 3, 3),
        );
        Ok(ImageBuffer::from_image(output))
    }

    fn detect_edges(
        &self,
        input: &ImageBuffer,
        low_threshold: f32,
        high_threshold: f32,
    ) -> Result<GrayImage, EngineError> {
        let high = high_threshold.max(MIN_EDGE_THRESHOLD);
        let low = low_threshold.max(MIN_EDGE_THRESHOLD).min(high);
        let luma = luminance_plane(input.as_image());
        Ok(imageproc::edges::canny(&luma, low, high))
    }

    fn dilate(
        &self,
        mask: &GrayImage,
        kernel_radius: u8,
        iterations: u32,
    ) -> Result<GrayImage, EngineError> {
        let mut dilated = mask.clone();
        for _ in 0..iterations {
            dilated = imageproc::morphology::dilate(&dilated, Norm::LInf, kernel_radius);
        }
        Ok(dilated)
    }

    fn inpaint(
        &self,
        input: &ImageBuffer,
        mask: &GrayImage,
        radius: u32,
    ) -> Result<ImageBuffer, EngineError> {
        if mask.dimensions() != input.as_image().dimensions() {
            return Err(EngineError::Malformed(format!(
                "inpaint mask is {}x{} but image is {}x{}",
                mask.width(),
                mask.height(),
                input.width(),
                input.height(),
            )));
        }
        Ok(ImageBuffer::from_image(diffuse_inpaint(
            input.as_image(),
            mask,
            radius.max(1),
        )))
    }

    fn median_filter(&self, input: &ImageBuffer, radius: u32) -> Result<ImageBuffer, EngineError> {
        Ok(ImageBuffer::from_image(imageproc::filter::median_filter(
            input.as_image(),
            radius,
            radius,
        )))
    }

    fn resize(
        &self,
        input: &ImageBuffer,
        width: u32,
        height: u32,
    ) -> Result<ImageBuffer, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::Malformed(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        let resized = image::imageops::resize(
            input.as_image(),
            width,
            height,
            image::imageops::FilterType::Triangle,
        );
        Ok(ImageBuffer::from_image(resized))
    }

    fn encode(
        &self,
        input: &ImageBuffer,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, EngineError> {
        let image = input.as_image();
        let mut buf = Vec::new();
        match format {
            OutputFormat::Png => {
                let encoder = image::codecs::png::PngEncoder::new(&mut buf);
                image::ImageEncoder::write_image(
                    encoder,
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ExtendedColorType::Rgba8,
                )?;
            }
            OutputFormat::Jpg => {
                // JPEG has no alpha channel; flatten to RGB first.
                let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
                let encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
                image::ImageEncoder::write_image(
                    encoder,
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ExtendedColorType::Rgb8,
                )?;
            }
            OutputFormat::Webp => {
                // The `image` crate encodes WebP losslessly; quality is
                // not applicable.
                let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut buf);
                image::ImageEncoder::write_image(
                    encoder,
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ExtendedColorType::Rgba8,
                )?;
            }
        }
        Ok(buf)
    }
}

/// Extract the BT.601 luminance plane from an RGBA image.
fn luminance_plane(image: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, _] = image.get_pixel(x, y).0;
        let luma = f32::from(r)
            .mul_add(0.299, f32::from(g).mul_add(0.587, f32::from(b) * 0.114))
            .round()
            .clamp(0.0, 255.0);
        Luma([luma as u8])
    })
}

/// Edge-preserving bilateral smoothing on a single channel.
///
/// Each output pixel is the weighted mean of its spatial neighborhood,
/// with weights combining spatial distance and value similarity so
/// smoothing does not cross strong edges.
fn bilateral_gray(plane: &GrayImage, radius: u32, range_sigma: f32) -> GrayImage {
    let (width, height) = plane.dimensions();
    let range_div = 2.0 * range_sigma * range_sigma;
    let spatial_sigma = radius as f32;
    let spatial_div = 2.0 * spatial_sigma * spatial_sigma;

    GrayImage::from_fn(width, height, |x, y| {
        let center = f32::from(plane.get_pixel(x, y).0[0]);
        let mut sum = 0.0_f32;
        let mut weight_sum = 0.0_f32;

        let y_start = y.saturating_sub(radius);
        let y_end = (y + radius + 1).min(height);
        let x_start = x.saturating_sub(radius);
        let x_end = (x + radius + 1).min(width);

        for ny in y_start..y_end {
            for nx in x_start..x_end {
                let value = f32::from(plane.get_pixel(nx, ny).0[0]);
                let value_delta = value - center;
                let dx = nx as f32 - x as f32;
                let dy = ny as f32 - y as f32;
                let weight = (-(value_delta * value_delta) / range_div
                    - dx.mul_add(dx, dy * dy) / spatial_div)
                    .exp();
                sum += value * weight;
                weight_sum += weight;
            }
        }

        if weight_sum > 0.0 {
            Luma([(sum / weight_sum).round().clamp(0.0, 255.0) as u8])
        } else {
            Luma([center as u8])
        }
    })
}

/// Apply a processed luminance plane back onto the color image by
/// adding the per-pixel luminance delta to every color channel,
/// preserving chroma.
fn recombine_luminance(
    original: &RgbaImage,
    luma_before: &GrayImage,
    luma_after: &GrayImage,
) -> RgbaImage {
    RgbaImage::from_fn(original.width(), original.height(), |x, y| {
        let pixel = original.get_pixel(x, y).0;
        let delta = i16::from(luma_after.get_pixel(x, y).0[0])
            - i16::from(luma_before.get_pixel(x, y).0[0]);
        let shift = |channel: u8| -> u8 {
            (i16::from(channel) + delta).clamp(0, 255) as u8
        };
        image::Rgba([shift(pixel[0]), shift(pixel[1]), shift(pixel[2]), pixel[3]])
    })
}

/// Gaussian blur on RGBA by blurring each channel plane independently.
///
/// `imageproc::filter::gaussian_blur_f32` accepts single-channel images,
/// so the image is split into four planes, blurred, and reassembled.
/// Gaussian blur is linear and per-channel, so this matches blurring in
/// color space.
fn gaussian_blur_rgba(image: &RgbaImage, sigma: f32) -> RgbaImage {
    let (width, height) = image.dimensions();

    let planes: [GrayImage; 4] = std::array::from_fn(|c| {
        GrayImage::from_fn(width, height, |x, y| Luma([image.get_pixel(x, y).0[c]]))
    });
    let blurred: [GrayImage; 4] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&planes[c], sigma));

    RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
            blurred[3].get_pixel(x, y).0[0],
        ])
    })
}

/// Fill masked pixels by iterative diffusion from known neighbors.
///
/// Each pass assigns every still-unknown pixel that touches at least
/// one known pixel the mean of the known pixels inside its
/// `radius`-window, then marks it known. Filling therefore marches
/// inward from the mask boundary until nothing is left (or a pass makes
/// no progress, which only happens when the mask covers the whole
/// image and there is no context to diffuse from).
fn diffuse_inpaint(image: &RgbaImage, mask: &GrayImage, radius: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let mut working = image.clone();
    let mut unknown: Vec<(u32, u32)> = mask
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| (x, y))
        .collect();
    let mut known = vec![true; (width * height) as usize];
    for &(x, y) in &unknown {
        known[(y * width + x) as usize] = false;
    }

    while !unknown.is_empty() {
        let mut filled: Vec<(u32, u32, image::Rgba<u8>)> = Vec::new();
        let mut remaining: Vec<(u32, u32)> = Vec::new();

        for &(x, y) in &unknown {
            match mean_of_known(&working, &known, x, y, radius) {
                Some(pixel) => filled.push((x, y, pixel)),
                None => remaining.push((x, y)),
            }
        }

        if filled.is_empty() {
            // No context anywhere in reach; leave the rest untouched.
            break;
        }

        for (x, y, pixel) in filled {
            working.put_pixel(x, y, pixel);
            known[(y * width + x) as usize] = true;
        }
        unknown = remaining;
    }

    working
}

/// Mean of the known pixels within the window, or `None` when the
/// window holds no known pixel yet.
fn mean_of_known(
    image: &RgbaImage,
    known: &[bool],
    x: u32,
    y: u32,
    radius: u32,
) -> Option<image::Rgba<u8>> {
    let (width, height) = image.dimensions();
    let mut sums = [0.0_f32; 4];
    let mut count = 0.0_f32;

    let y_start = y.saturating_sub(radius);
    let y_end = (y + radius + 1).min(height);
    let x_start = x.saturating_sub(radius);
    let x_end = (x + radius + 1).min(width);

    for ny in y_start..y_end {
        for nx in x_start..x_end {
            if known[(ny * width + nx) as usize] {
                let pixel = image.get_pixel(nx, ny).0;
                for (sum, channel) in sums.iter_mut().zip(pixel) {
                    *sum += f32::from(channel);
                }
                count += 1.0;
            }
        }
    }

    if count > 0.0 {
        Some(image::Rgba(std::array::from_fn(|c| {
            (sums[c] / count).round().clamp(0.0, 255.0) as u8
        })))
    } else {
        None
    }
}
