//! Shared types for the maskfit pipeline.

use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::latent::Latent;
use crate::resample::ResampleMethod;
use crate::summary::FitSummary;

/// Spatial size of a tensor in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels (the `width` axis).
    pub width: usize,
    /// Height in pixels (the `height` axis).
    pub height: usize,
}

impl Dimensions {
    /// Create dimensions from a width and a height.
    #[must_use]
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Configuration for the mask fitting pipeline.
///
/// The defaults reproduce the canonical fit: nearest-exact resampling
/// for both the image-resolution and latent-resolution passes, and the
/// red channel as the intermediate read-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Interpolation used when scaling the mask to the image size.
    pub resample_method: ResampleMethod,

    /// Interpolation used when projecting the fitted mask onto the
    /// latent grid.
    pub latent_resample_method: ResampleMethod,

    /// Channel read back from the resampled mask-image before it is
    /// composited. The lifted mask-image has a single channel, so every
    /// name resolves to it; the setting only matters for 4-axis masks
    /// that carry more than one channel.
    pub intermediate_channel: Channel,
}

impl FitConfig {
    /// Default interpolation for the image-resolution pass.
    pub const DEFAULT_RESAMPLE_METHOD: ResampleMethod = ResampleMethod::NearestExact;
    /// Default interpolation for the latent-resolution pass.
    pub const DEFAULT_LATENT_RESAMPLE_METHOD: ResampleMethod = ResampleMethod::NearestExact;
    /// Default intermediate read-back channel.
    pub const DEFAULT_INTERMEDIATE_CHANNEL: Channel = Channel::Red;
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            resample_method: Self::DEFAULT_RESAMPLE_METHOD,
            latent_resample_method: Self::DEFAULT_LATENT_RESAMPLE_METHOD,
            intermediate_channel: Self::DEFAULT_INTERMEDIATE_CHANNEL,
        }
    }
}

/// Everything a single pipeline invocation produces.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Final mask `(batch, height, width)` at the image resolution,
    /// read back from the alpha channel of [`preview_image`](Self::preview_image).
    pub fixed_mask: Array3<f32>,

    /// The source image with the fitted mask as its alpha channel,
    /// `(batch, height, width, 4)`.
    pub preview_image: Array4<f32>,

    /// Copy of the caller's latent with `"noise_mask"` set, or `None`
    /// when no latent was supplied.
    pub masked_latent: Option<Latent>,

    /// What the stages decided (sizes, scale factors, resampling).
    pub summary: FitSummary,
}

impl FitResult {
    /// Human-readable multi-line description of the fit.
    #[must_use]
    pub fn info(&self) -> String {
        self.summary.report()
    }

    /// Split into the positional outputs `(fixed_mask, preview_image,
    /// info, masked_latent)` expected by node-graph hosts.
    #[must_use]
    pub fn into_outputs(self) -> (Array3<f32>, Array4<f32>, String, Option<Latent>) {
        let info = self.summary.report();
        (self.fixed_mask, self.preview_image, info, self.masked_latent)
    }
}

/// Errors that abort a pipeline invocation.
///
/// Every variant stems from malformed input shapes; none is transient.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum FitError {
    /// A tensor has an unsupported rank or an empty spatial axis.
    #[error("{tensor} has shape {shape:?}, expected {expected}")]
    Shape {
        /// Which input was rejected (`"image"`, `"mask"`, ...).
        tensor: String,
        /// The shape that was received.
        shape: Vec<usize>,
        /// Description of the accepted shapes.
        expected: String,
    },

    /// A channel name is unknown or the channel is not present.
    #[error("cannot extract channel {channel:?}: {reason}")]
    Channel {
        /// The requested channel name.
        channel: String,
        /// Why extraction failed.
        reason: String,
    },

    /// The mask does not cover the image it is composited onto.
    #[error("mask shape {mask:?} does not match image shape {image:?}")]
    DimensionMismatch {
        /// Shape of the mask `(batch, height, width)`.
        mask: Vec<usize>,
        /// Shape of the image `(batch, height, width, channels)`.
        image: Vec<usize>,
    },

    /// The latent structure cannot receive a noise mask.
    #[error("invalid latent format: {0}")]
    LatentFormat(String),
}

impl FitError {
    pub(crate) fn shape(tensor: &str, shape: &[usize], expected: &str) -> Self {
        Self::Shape {
            tensor: tensor.to_owned(),
            shape: shape.to_vec(),
            expected: expected.to_owned(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_is_empty() {
        assert!(Dimensions::new(0, 5).is_empty());
        assert!(Dimensions::new(5, 0).is_empty());
        assert!(!Dimensions::new(1, 1).is_empty());
    }

    #[test]
    fn fit_config_defaults() {
        let config = FitConfig::default();
        assert_eq!(config.resample_method, ResampleMethod::NearestExact);
        assert_eq!(config.latent_resample_method, ResampleMethod::NearestExact);
        assert_eq!(config.intermediate_channel, Channel::Red);
    }

    #[test]
    fn fit_config_serde_round_trip() {
        let config = FitConfig {
            resample_method: ResampleMethod::Bilinear,
            latent_resample_method: ResampleMethod::Nearest,
            intermediate_channel: Channel::Green,
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: FitConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn fit_config_partial_json_fills_defaults() {
        let config: FitConfig = serde_json::from_str(r#"{"resample_method":"Bilinear"}"#).unwrap();
        assert_eq!(config.resample_method, ResampleMethod::Bilinear);
        assert_eq!(config.latent_resample_method, ResampleMethod::NearestExact);
    }

    #[test]
    fn error_shape_display() {
        let err = FitError::shape("image", &[1, 2, 3], "4 axes (batch, height, width, channel)");
        assert_eq!(
            err.to_string(),
            "image has shape [1, 2, 3], expected 4 axes (batch, height, width, channel)",
        );
    }

    #[test]
    fn error_dimension_mismatch_display() {
        let err = FitError::DimensionMismatch {
            mask: vec![1, 8, 8],
            image: vec![1, 16, 16, 3],
        };
        assert_eq!(
            err.to_string(),
            "mask shape [1, 8, 8] does not match image shape [1, 16, 16, 3]",
        );
    }

    #[test]
    fn error_latent_format_display() {
        let err = FitError::LatentFormat("missing 'samples' entry".to_owned());
        assert_eq!(
            err.to_string(),
            "invalid latent format: missing 'samples' entry"
        );
    }

    #[test]
    fn error_serde_round_trip() {
        let err = FitError::Channel {
            channel: "alpha".to_owned(),
            reason: "tensor has 3 channels".to_owned(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: FitError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }
}
