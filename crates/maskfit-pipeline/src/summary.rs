//! Human-readable summary of what a fit did.

use serde::{Deserialize, Serialize};

use crate::lift::MaskLayout;
use crate::types::Dimensions;

/// What the pipeline stages decided for one invocation.
///
/// Purely informational: it mirrors the decisions the stages actually
/// made and is rendered as the `info` output by [`report`](Self::report).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    /// Spatial size of the mask as supplied.
    pub mask: Dimensions,
    /// Spatial size of the reference image (the fit target).
    pub image: Dimensions,
    /// Rank normalization applied to the mask.
    pub mask_layout: MaskLayout,
    /// `image.width / mask.width`.
    pub scale_width: f64,
    /// `image.height / mask.height`.
    pub scale_height: f64,
    /// Whether the mask was resampled to reach the image size.
    pub resampled: bool,
    /// Spatial size of the projected noise mask, when a latent was given.
    pub latent: Option<Dimensions>,
}

impl FitSummary {
    /// Build a summary, computing both scale factors independently.
    #[must_use]
    pub fn new(
        mask: Dimensions,
        image: Dimensions,
        mask_layout: MaskLayout,
        resampled: bool,
        latent: Option<Dimensions>,
    ) -> Self {
        Self {
            mask,
            image,
            mask_layout,
            scale_width: scale_factor(mask.width, image.width),
            scale_height: scale_factor(mask.height, image.height),
            resampled,
            latent,
        }
    }

    /// Format the summary as the multi-line `info` text.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = vec![
            "== Fit Mask to Image ==".to_owned(),
            format!("Mask:  {}×{}", self.mask.width, self.mask.height),
            format!("Image: {}×{}", self.image.width, self.image.height),
            format!(
                "Scale: {:.2}x × {:.2}x",
                self.scale_width, self.scale_height
            ),
        ];

        if self.resampled {
            lines.push("Status: Scaled successfully".to_owned());
        } else {
            lines.push("Status: No scaling needed".to_owned());
        }

        if self.latent.is_some() {
            lines.push("Latent: Mask applied".to_owned());
        }

        lines.join("\n")
    }
}

/// Ratio `to / from`, or `1.0` when `from` is zero.
#[allow(clippy::cast_precision_loss)]
fn scale_factor(from: usize, to: usize) -> f64 {
    if from == 0 {
        1.0
    } else {
        to as f64 / from as f64
    }
}
