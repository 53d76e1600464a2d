//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process`] which runs every stage in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use maskfit_pipeline::{FitConfig, FitError, Pipeline};
//! # use ndarray::{ArrayD, IxDyn};
//! # fn run() -> Result<(), FitError> {
//! let image = ArrayD::<f32>::zeros(IxDyn(&[1, 16, 16, 3]));
//! let mask = ArrayD::<f32>::ones(IxDyn(&[1, 8, 8]));
//! let result = Pipeline::new(&image, &mask, None, FitConfig::default())
//!     .measure()?
//!     .lift()?
//!     .resample()?
//!     .lower()?
//!     .composite()?
//!     .project_latent()?
//!     .into_result();
//! assert_eq!(result.fixed_mask.shape(), &[1, 16, 16]);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state,
//! carrying forward what later stages and the summary need. The inputs
//! are only borrowed; every intermediate is a fresh allocation.

use ndarray::{Array3, Array4, ArrayD, ArrayView4, Axis, Ix4};

use crate::channel::{Channel, image_to_mask};
use crate::composite::{AlphaMode, merge_alpha};
use crate::diagnostics::StageMetrics;
use crate::dimensions::{image_dimensions, mask_dimensions};
use crate::latent::{Latent, scale_mask_for_latent};
use crate::lift::{MaskLayout, mask_to_image};
use crate::resample::scale_image;
use crate::summary::FitSummary;
use crate::types::{Dimensions, FitConfig, FitError, FitResult};

/// Entry point for the staged pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Borrow the inputs and return the initial [`Pending`] state.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new<'a>(
        image: &'a ArrayD<f32>,
        mask: &'a ArrayD<f32>,
        latent: Option<&'a Latent>,
        config: FitConfig,
    ) -> Pending<'a> {
        Pending {
            config,
            image,
            mask,
            latent,
        }
    }
}

/// Inputs and measurements shared by every state after [`Pending`].
struct Measurements<'a> {
    config: FitConfig,
    image: ArrayView4<'a, f32>,
    mask: &'a ArrayD<f32>,
    latent: Option<&'a Latent>,
    /// Spatial size of the reference image.
    target: Dimensions,
    /// Spatial size of the mask as supplied.
    source: Dimensions,
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`measure`](Self::measure) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .measure() to continue"]
pub struct Pending<'a> {
    config: FitConfig,
    image: &'a ArrayD<f32>,
    mask: &'a ArrayD<f32>,
    latent: Option<&'a Latent>,
}

impl<'a> Pending<'a> {
    /// Read the target size from the image and the current size from
    /// the mask.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::Shape`] if the image is not 4-axis or the
    /// mask is not 2-, 3- or 4-axis, or if either is spatially empty.
    pub fn measure(self) -> Result<Measured<'a>, FitError> {
        let target = image_dimensions(self.image)?;
        let source = mask_dimensions(self.mask)?;
        let image = self
            .image
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| FitError::shape("image", self.image.shape(), "4 axes"))?;

        tracing::debug!(
            image = ?self.image.shape(),
            mask = ?self.mask.shape(),
            "measured inputs"
        );

        Ok(Measured {
            m: Measurements {
                config: self.config,
                image,
                mask: self.mask,
                latent: self.latent,
                target,
                source,
            },
        })
    }
}

// ───────────────────────── Stage 1: Measured ─────────────────────────

/// Pipeline state after dimension extraction.
#[must_use = "pipeline stages are consumed by advancing; call .lift() to continue"]
pub struct Measured<'a> {
    m: Measurements<'a>,
}

impl<'a> Measured<'a> {
    /// Spatial size of the reference image.
    #[must_use]
    pub const fn target(&self) -> Dimensions {
        self.m.target
    }

    /// Spatial size of the mask as supplied.
    #[must_use]
    pub const fn source(&self) -> Dimensions {
        self.m.source
    }

    /// Lift the mask into a single-channel image tensor.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::Shape`] if the mask cannot be normalized.
    pub fn lift(self) -> Result<Lifted<'a>, FitError> {
        let (mask_image, layout) = mask_to_image(self.m.mask)?;
        tracing::debug!(%layout, shape = ?mask_image.shape(), "lifted mask to image");
        Ok(Lifted {
            m: self.m,
            mask_image,
            layout,
        })
    }
}

// ───────────────────────── Stage 2: Lifted ───────────────────────────

/// Pipeline state after the mask was lifted to `(batch, height, width, 1)`.
#[must_use = "pipeline stages are consumed by advancing; call .resample() to continue"]
pub struct Lifted<'a> {
    m: Measurements<'a>,
    mask_image: Array4<f32>,
    layout: MaskLayout,
}

impl<'a> Lifted<'a> {
    /// The lifted mask-image.
    #[must_use]
    pub const fn mask_image(&self) -> &Array4<f32> {
        &self.mask_image
    }

    /// Which rank normalization the mask went through.
    #[must_use]
    pub const fn layout(&self) -> MaskLayout {
        self.layout
    }

    /// Scale the mask-image to the reference image size.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::Shape`] if the resampler rejects the sizes.
    pub fn resample(self) -> Result<Resampled<'a>, FitError> {
        let (scaled, applied) =
            scale_image(self.mask_image, self.m.target, self.m.config.resample_method)?;
        tracing::debug!(
            from = ?self.m.source,
            to = ?self.m.target,
            method = %self.m.config.resample_method,
            applied,
            "resampled mask-image"
        );
        Ok(Resampled {
            m: self.m,
            layout: self.layout,
            scaled,
            applied,
        })
    }
}

// ───────────────────────── Stage 3: Resampled ────────────────────────

/// Pipeline state after resampling to the image resolution.
#[must_use = "pipeline stages are consumed by advancing; call .lower() to continue"]
pub struct Resampled<'a> {
    m: Measurements<'a>,
    layout: MaskLayout,
    scaled: Array4<f32>,
    applied: bool,
}

impl<'a> Resampled<'a> {
    /// The mask-image at the reference image resolution.
    #[must_use]
    pub const fn scaled(&self) -> &Array4<f32> {
        &self.scaled
    }

    /// Whether resampling was actually performed.
    #[must_use]
    pub const fn applied(&self) -> bool {
        self.applied
    }

    /// Read the configured intermediate channel back out as a mask.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::Channel`] if the channel is not present.
    pub fn lower(self) -> Result<Lowered<'a>, FitError> {
        let channel = self.m.config.intermediate_channel;
        let intermediate = image_to_mask(&self.scaled, channel)?;
        tracing::debug!(%channel, "lowered mask-image to mask");
        Ok(Lowered {
            source_channels: self.scaled.len_of(Axis(3)),
            m: self.m,
            layout: self.layout,
            applied: self.applied,
            intermediate,
        })
    }
}

// ───────────────────────── Stage 4: Lowered ──────────────────────────

/// Pipeline state after the intermediate channel read-back.
#[must_use = "pipeline stages are consumed by advancing; call .composite() to continue"]
pub struct Lowered<'a> {
    m: Measurements<'a>,
    layout: MaskLayout,
    applied: bool,
    source_channels: usize,
    intermediate: Array3<f32>,
}

impl<'a> Lowered<'a> {
    /// The intermediate `(batch, height, width)` mask.
    #[must_use]
    pub const fn intermediate(&self) -> &Array3<f32> {
        &self.intermediate
    }

    /// Composite the mask onto the source image as alpha and read the
    /// final mask back out of the alpha channel.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::DimensionMismatch`] if the mask does not
    /// cover the image.
    pub fn composite(self) -> Result<Composited<'a>, FitError> {
        let preview = merge_alpha(&self.m.image, &self.intermediate)?;
        let fixed_mask = image_to_mask(&preview, Channel::Alpha)?;
        let mode = AlphaMode::for_channels(self.m.image.len_of(Axis(3)));
        tracing::debug!(%mode, shape = ?preview.shape(), "composited alpha");
        Ok(Composited {
            m: self.m,
            layout: self.layout,
            applied: self.applied,
            mode,
            preview,
            fixed_mask,
        })
    }
}

// ───────────────────────── Stage 5: Composited ───────────────────────

/// Pipeline state after alpha compositing.
#[must_use = "pipeline stages are consumed by advancing; call .project_latent() to continue"]
pub struct Composited<'a> {
    m: Measurements<'a>,
    layout: MaskLayout,
    applied: bool,
    mode: AlphaMode,
    preview: Array4<f32>,
    fixed_mask: Array3<f32>,
}

impl Composited<'_> {
    /// The composited `(batch, height, width, 4)` preview image.
    #[must_use]
    pub const fn preview(&self) -> &Array4<f32> {
        &self.preview
    }

    /// The final mask read back from the preview's alpha channel.
    #[must_use]
    pub const fn fixed_mask(&self) -> &Array3<f32> {
        &self.fixed_mask
    }

    /// Project the fitted mask onto the latent, if one was supplied.
    /// Without a latent this is a pass-through.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::LatentFormat`] if the latent has no usable
    /// `"samples"` tensor.
    pub fn project_latent(self) -> Result<Projected, FitError> {
        let projection = match self.m.latent {
            Some(latent) => {
                let target = latent.latent_dimensions()?;
                let (noise_mask, applied) = scale_mask_for_latent(
                    &self.fixed_mask,
                    target,
                    self.m.config.latent_resample_method,
                )?;
                tracing::debug!(to = ?target, applied, "projected mask onto latent");
                Some(LatentProjection {
                    latent: latent.with_noise_mask(noise_mask),
                    target,
                    applied,
                })
            }
            None => None,
        };

        let summary = FitSummary::new(
            self.m.source,
            self.m.target,
            self.layout,
            self.applied,
            projection.as_ref().map(|p| p.target),
        );

        Ok(Projected {
            config: self.m.config,
            preview: self.preview,
            fixed_mask: self.fixed_mask,
            projection,
            summary,
        })
    }
}

// ───────────────────────── Stage 6: Projected ────────────────────────

/// A mask attached to a latent copy, plus what the projection did.
struct LatentProjection {
    latent: Latent,
    target: Dimensions,
    applied: bool,
}

/// Pipeline state after the optional latent projection, the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the [`FitResult`].
#[must_use = "call .into_result() to extract the FitResult"]
pub struct Projected {
    config: FitConfig,
    preview: Array4<f32>,
    fixed_mask: Array3<f32>,
    projection: Option<LatentProjection>,
    summary: FitSummary,
}

impl Projected {
    /// The latent copy carrying `"noise_mask"`, if a latent was supplied.
    #[must_use]
    pub fn masked_latent(&self) -> Option<&Latent> {
        self.projection.as_ref().map(|p| &p.latent)
    }

    /// The summary of every stage's decisions.
    #[must_use]
    pub const fn summary(&self) -> &FitSummary {
        &self.summary
    }

    /// Consume the pipeline and return the [`FitResult`].
    #[must_use]
    pub fn into_result(self) -> FitResult {
        FitResult {
            fixed_mask: self.fixed_mask,
            preview_image: self.preview,
            masked_latent: self.projection.map(|p| p.latent),
            summary: self.summary,
        }
    }
}

// ──────────────────────── PipelineStage trait ────────────────────────

/// Total number of stages in the pipeline, counting [`Pending`].
pub const STAGE_COUNT: usize = 7;

/// Trait implemented by every pipeline state, giving diagnostics a
/// uniform view of the stages.
pub trait PipelineStage {
    /// Human-readable name of the stage that produced this state.
    const NAME: &'static str;

    /// Zero-based index of this state (`0` for [`Pending`] through `6`
    /// for [`Projected`]).
    const INDEX: usize;

    /// Stage-specific metrics describing the work done to reach this
    /// state, or `None` if no work was done.
    fn metrics(&self) -> Option<StageMetrics>;
}

impl PipelineStage for Pending<'_> {
    const NAME: &'static str = "pending";
    const INDEX: usize = 0;

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }
}

impl PipelineStage for Measured<'_> {
    const NAME: &'static str = "measure";
    const INDEX: usize = 1;

    fn metrics(&self) -> Option<StageMetrics> {
        let (batch, _, _, channels) = self.m.image.dim();
        Some(StageMetrics::Measure {
            image: self.m.target,
            image_batch: batch,
            image_channels: channels,
            mask: self.m.source,
            mask_rank: self.m.mask.ndim(),
        })
    }
}

impl PipelineStage for Lifted<'_> {
    const NAME: &'static str = "lift";
    const INDEX: usize = 2;

    fn metrics(&self) -> Option<StageMetrics> {
        let (batch, _, _, channels) = self.mask_image.dim();
        Some(StageMetrics::Lift {
            layout: self.layout,
            batch,
            channels,
        })
    }
}

impl PipelineStage for Resampled<'_> {
    const NAME: &'static str = "resample";
    const INDEX: usize = 3;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Resample {
            from: self.m.source,
            to: self.m.target,
            method: self.m.config.resample_method.to_string(),
            applied: self.applied,
        })
    }
}

impl PipelineStage for Lowered<'_> {
    const NAME: &'static str = "lower";
    const INDEX: usize = 4;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Lower {
            channel: self.m.config.intermediate_channel.to_string(),
            source_channels: self.source_channels,
        })
    }
}

impl PipelineStage for Composited<'_> {
    const NAME: &'static str = "composite";
    const INDEX: usize = 5;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Composite {
            mode: self.mode,
            source_channels: self.m.image.len_of(Axis(3)),
        })
    }
}

impl PipelineStage for Projected {
    const NAME: &'static str = "latent";
    const INDEX: usize = 6;

    /// `None` when no latent was supplied.
    fn metrics(&self) -> Option<StageMetrics> {
        self.projection.as_ref().map(|p| StageMetrics::Latent {
            from: self.summary.image,
            to: p.target,
            method: self.config.latent_resample_method.to_string(),
            applied: p.applied,
        })
    }
}
