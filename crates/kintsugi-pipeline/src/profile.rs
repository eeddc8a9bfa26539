//! Capability profile: variant selection done once at engine-load time.
//!
//! Stages that have fallback implementations (denoise, scratch repair)
//! do not probe the engine per call. The profile inspects
//! [`Capabilities`] exactly once when the engine becomes ready and
//! records which variant each stage will use for the lifetime of the
//! process.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::{Capabilities, Engine};

/// Which denoise implementation the pipeline will use.
///
/// Ordered preference: color-aware non-local-means, then
/// grayscale-domain denoising re-composited to color, then a plain
/// Gaussian blur with a kernel size derived from strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenoiseVariant {
    /// Color-aware non-local-means (preferred primitive).
    ColorNonLocalMeans,
    /// Luminance-channel denoise re-composited with the original chroma.
    LuminanceRecombined,
    /// Gaussian blur fallback; always available.
    GaussianBlur,
}

impl fmt::Display for DenoiseVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColorNonLocalMeans => f.write_str("color non-local-means"),
            Self::LuminanceRecombined => f.write_str("luminance denoise"),
            Self::GaussianBlur => f.write_str("gaussian blur"),
        }
    }
}

/// Which scratch-repair implementation the pipeline will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScratchVariant {
    /// Edge detection + dilation + context inpainting (preferred).
    Inpaint,
    /// Whole-image median filter, a coarse substitute used when the
    /// engine has no inpainting primitive.
    MedianFilter,
}

impl fmt::Display for ScratchVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inpaint => f.write_str("inpaint"),
            Self::MedianFilter => f.write_str("median filter"),
        }
    }
}

/// The variants selected for this engine, fixed for the process
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    /// Selected denoise implementation.
    pub denoise: DenoiseVariant,
    /// Selected scratch-repair implementation.
    pub scratch: ScratchVariant,
}

impl CapabilityProfile {
    /// Select the best available variant for each stage from the
    /// engine's declared capabilities.
    #[must_use]
    pub fn detect(engine: &dyn Engine) -> Self {
        Self::from_capabilities(engine.capabilities())
    }

    /// Variant selection from a capability set; split out so tests can
    /// exercise the chain without building engines.
    #[must_use]
    pub const fn from_capabilities(caps: Capabilities) -> Self {
        let denoise = if caps.denoise_color {
            DenoiseVariant::ColorNonLocalMeans
        } else if caps.denoise_luminance {
            DenoiseVariant::LuminanceRecombined
        } else {
            DenoiseVariant::GaussianBlur
        };

        let scratch = if caps.inpaint {
            ScratchVariant::Inpaint
        } else {
            ScratchVariant::MedianFilter
        };

        Self { denoise, scratch }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_capabilities_pick_preferred_variants() {
        let profile = CapabilityProfile::from_capabilities(Capabilities {
            denoise_color: true,
            denoise_luminance: true,
            inpaint: true,
        });
        assert_eq!(profile.denoise, DenoiseVariant::ColorNonLocalMeans);
        assert_eq!(profile.scratch, ScratchVariant::Inpaint);
    }

    #[test]
    fn missing_color_denoise_falls_back_to_luminance() {
        let profile = CapabilityProfile::from_capabilities(Capabilities {
            denoise_color: false,
            denoise_luminance: true,
            inpaint: true,
        });
        assert_eq!(profile.denoise, DenoiseVariant::LuminanceRecombined);
    }

    #[test]
    fn no_denoise_primitives_fall_back_to_blur() {
        let profile = CapabilityProfile::from_capabilities(Capabilities::default());
        assert_eq!(profile.denoise, DenoiseVariant::GaussianBlur);
        assert_eq!(profile.scratch, ScratchVariant::MedianFilter);
    }

    #[test]
    fn variant_display_labels() {
        assert_eq!(DenoiseVariant::GaussianBlur.to_string(), "gaussian blur");
        assert_eq!(ScratchVariant::MedianFilter.to_string(), "median filter");
    }
}
