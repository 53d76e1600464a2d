//! maskfit-pipeline: Pure mask fitting pipeline (sans-IO).
//!
//! Resizes a single-channel mask so it matches a reference image exactly,
//! through:
//! measure -> lift to image -> resample -> lower to mask -> alpha
//! composite -> optional latent projection.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! tensors and returns structured data. Decoding and writing image files
//! lives in `maskfit-cli`.
//!
//! Tensors follow the node-graph conventions: images are
//! `(batch, height, width, channel)` with values in `[0, 1]`, masks are
//! `(batch, height, width)`, and latent samples are
//! `(batch, channel, height, width)`.

pub mod channel;
pub mod composite;
pub mod diagnostics;
pub mod dimensions;
pub mod latent;
pub mod lift;
pub mod pipeline;
pub mod resample;
pub mod summary;
pub mod types;

pub use channel::{Channel, image_to_mask, image_to_mask_named};
pub use composite::{AlphaMode, merge_alpha};
pub use dimensions::{image_dimensions, mask_dimensions};
pub use latent::{Latent, LatentEntry, apply_mask_to_latent, scale_mask_for_latent};
pub use lift::{MaskLayout, mask_to_image};
pub use pipeline::{Pipeline, PipelineStage};
pub use resample::{ResampleMethod, scale_image};
pub use summary::FitSummary;
pub use types::{Dimensions, FitConfig, FitError, FitResult};

use ndarray::ArrayD;

/// Fit `mask` to the spatial size of `image` and, optionally, project
/// it onto `latent`.
///
/// # Pipeline steps
///
/// 1. Read the target size from the image and the current size from the mask
/// 2. Lift the mask to a single-channel image
/// 3. Resample to the image size (skipped when sizes already match)
/// 4. Read the configured intermediate channel back out as a mask
/// 5. Composite the mask onto the source image as alpha and read the
///    final mask back from that alpha channel
/// 6. Optionally attach the mask to a copy of the latent as `"noise_mask"`
///
/// No input is modified.
///
/// # Errors
///
/// Returns [`FitError::Shape`] if the image is not 4-axis, the mask is
/// not 2-, 3- or 4-axis, or either has an empty spatial axis.
/// Returns [`FitError::DimensionMismatch`] if the mask batch cannot be
/// broadcast over the image batch.
/// Returns [`FitError::LatentFormat`] if `latent` has no usable
/// `"samples"` tensor.
pub fn process(
    image: &ArrayD<f32>,
    mask: &ArrayD<f32>,
    latent: Option<&Latent>,
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    let span = tracing::debug_span!("fit_mask", image = ?image.shape(), mask = ?mask.shape());
    let _guard = span.enter();

    let result = Pipeline::new(image, mask, latent, *config)
        .measure()?
        .lift()?
        .resample()?
        .lower()?
        .composite()?
        .project_latent()?
        .into_result();

    tracing::debug!(
        resampled = result.summary.resampled,
        latent = result.masked_latent.is_some(),
        "fit complete"
    );
    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::{Axis, IxDyn, s};

    use super::*;
    use crate::latent::{NOISE_MASK_KEY, SAMPLES_KEY};

    fn zeros(shape: &[usize]) -> ArrayD<f32> {
        ArrayD::zeros(IxDyn(shape))
    }

    fn ones(shape: &[usize]) -> ArrayD<f32> {
        ArrayD::ones(IxDyn(shape))
    }

    #[test]
    fn upscales_half_size_mask() {
        let image = zeros(&[1, 100, 150, 3]);
        let mask = ones(&[1, 50, 75]);

        let result = process(&image, &mask, None, &FitConfig::default()).unwrap();

        assert_eq!(result.fixed_mask.shape(), &[1, 100, 150]);
        assert!(result.fixed_mask.iter().all(|&v| v == 1.0));
        assert_eq!(result.preview_image.shape(), &[1, 100, 150, 4]);
        assert!(result.masked_latent.is_none());

        let info = result.info();
        assert!(info.contains("Scale: 2.00x × 2.00x"), "{info}");
        assert!(info.contains("Status: Scaled successfully"));
        assert!(!info.contains("Latent"));
    }

    #[test]
    fn matching_sizes_are_an_identity() {
        let image = zeros(&[1, 4, 4, 3]);
        let mask = ArrayD::from_shape_fn(IxDyn(&[1, 4, 4]), |idx| {
            #[allow(clippy::cast_precision_loss)]
            let v = (idx[1] * 4 + idx[2]) as f32 / 16.0;
            v
        });

        let result = process(&image, &mask, None, &FitConfig::default()).unwrap();

        assert_eq!(result.fixed_mask.clone().into_dyn(), mask);
        assert!(result.info().contains("Status: No scaling needed"));
    }

    #[test]
    fn preview_carries_image_colors_and_mask_alpha() {
        let image = ArrayD::from_shape_fn(IxDyn(&[1, 4, 4, 3]), |idx| match idx[3] {
            0 => 0.25,
            1 => 0.5,
            _ => 0.75,
        });
        let mask = ArrayD::from_shape_fn(IxDyn(&[1, 2, 2]), |idx| {
            if idx[2] == 0 { 0.0 } else { 1.0 }
        });

        let result = process(&image, &mask, None, &FitConfig::default()).unwrap();

        assert_eq!(result.preview_image.slice(s![0, 0, 0, ..]).to_vec(), vec![0.25, 0.5, 0.75, 0.0]);
        assert_eq!(result.preview_image.slice(s![0, 0, 3, ..]).to_vec(), vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(
            result.preview_image.index_axis(Axis(3), 3),
            result.fixed_mask.view(),
        );
    }

    #[test]
    fn two_axis_mask_fits_batched_image() {
        let image = zeros(&[1, 6, 6, 4]);
        let mask = ones(&[3, 3]);

        let result = process(&image, &mask, None, &FitConfig::default()).unwrap();

        assert_eq!(result.fixed_mask.shape(), &[1, 6, 6]);
        assert_eq!(result.summary.mask_layout, MaskLayout::Plane);
    }

    #[test]
    fn latent_receives_noise_mask() {
        let image = zeros(&[1, 512, 512, 3]);
        let mask = ones(&[1, 512, 512]);
        let latent = Latent::from_samples(zeros(&[1, 4, 64, 64]));

        let result = process(&image, &mask, Some(&latent), &FitConfig::default()).unwrap();

        let masked = result.masked_latent.as_ref().unwrap();
        assert!(masked.contains_key(SAMPLES_KEY));
        assert_eq!(masked.noise_mask().unwrap().shape(), &[1, 64, 64]);
        assert!(!latent.contains_key(NOISE_MASK_KEY));
        assert!(result.info().ends_with("Latent: Mask applied"));
    }

    #[test]
    fn invalid_image_rank_is_rejected() {
        let image = zeros(&[1, 1, 8, 8, 3]);
        let mask = ones(&[1, 4, 4]);
        let result = process(&image, &mask, None, &FitConfig::default());
        assert!(matches!(result, Err(FitError::Shape { ref tensor, .. }) if tensor == "image"));
    }

    #[test]
    fn latent_without_samples_is_rejected() {
        let image = zeros(&[1, 8, 8, 3]);
        let mask = ones(&[1, 8, 8]);
        let latent: Latent = [("batch_index", vec![0_i64])].into_iter().collect();
        let result = process(&image, &mask, Some(&latent), &FitConfig::default());
        assert!(matches!(result, Err(FitError::LatentFormat(_))));
    }

    #[test]
    fn inputs_are_not_modified() {
        let image = zeros(&[1, 8, 8, 4]);
        let mask = ones(&[1, 2, 2]);
        let (image_before, mask_before) = (image.clone(), mask.clone());

        let _ = process(&image, &mask, None, &FitConfig::default()).unwrap();

        assert_eq!(image, image_before);
        assert_eq!(mask, mask_before);
    }

    #[test]
    fn into_outputs_orders_positionally() {
        let image = zeros(&[1, 4, 4, 3]);
        let mask = ones(&[1, 2, 2]);
        let (fixed, preview, info, latent) = process(&image, &mask, None, &FitConfig::default())
            .unwrap()
            .into_outputs();
        assert_eq!(fixed.shape(), &[1, 4, 4]);
        assert_eq!(preview.shape(), &[1, 4, 4, 4]);
        assert!(info.starts_with("== Fit Mask to Image =="));
        assert!(latent.is_none());
    }
}
