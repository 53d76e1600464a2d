//! Mask-to-image lift: normalize any accepted mask rank into a
//! single-channel image tensor.
//!
//! Step 2 of the pipeline. Viewing the mask as a `(batch, height,
//! width, 1)` grayscale image lets the generic image resampler in
//! [`crate::resample`] serve masks unmodified.

use ndarray::{Array4, ArrayBase, Axis, Data, Ix4, IxDyn};
use serde::{Deserialize, Serialize};

use crate::dimensions::mask_dimensions;
use crate::types::FitError;

/// Which rank normalization a mask went through.
///
/// Recorded for diagnostics only; the lifted tensor is always
/// `(batch, height, width, channels)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskLayout {
    /// `(height, width)`: a batch axis and a channel axis were inserted.
    Plane,
    /// `(batch, height, width)`: a channel axis was appended.
    Batched,
    /// `(batch, height, width, channels)`: passed through.
    Channeled,
}

impl std::fmt::Display for MaskLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plane => f.write_str("HW"),
            Self::Batched => f.write_str("BHW"),
            Self::Channeled => f.write_str("BHWC"),
        }
    }
}

/// Clamp a sample into `[0, 1]`.
pub(crate) fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Lift a mask of rank 2, 3 or 4 into a `(batch, height, width, 1)`
/// image tensor with every value clamped to `[0, 1]`.
///
/// Rank-4 masks are passed through with their channel axis intact.
/// The returned [`MaskLayout`] records which path was taken.
///
/// # Errors
///
/// Returns [`FitError::Shape`] if the mask rank is not 2, 3 or 4, or
/// if its height or width is zero.
pub fn mask_to_image<S>(mask: &ArrayBase<S, IxDyn>) -> Result<(Array4<f32>, MaskLayout), FitError>
where
    S: Data<Elem = f32>,
{
    mask_dimensions(mask)?;

    let view = mask.view();
    let (lifted, layout) = match mask.ndim() {
        2 => (
            view.insert_axis(Axis(0)).insert_axis(Axis(3)),
            MaskLayout::Plane,
        ),
        3 => (view.insert_axis(Axis(3)), MaskLayout::Batched),
        _ => (view, MaskLayout::Channeled),
    };
    let lifted = lifted
        .into_dimensionality::<Ix4>()
        .map_err(|_| FitError::shape("mask", mask.shape(), "2, 3 or 4 axes"))?;

    Ok((lifted.mapv(clamp_unit), layout))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::{ArrayD, IxDyn};

    use super::*;

    fn ramp(shape: &[usize]) -> ArrayD<f32> {
        let len: usize = shape.iter().product();
        #[allow(clippy::cast_precision_loss)]
        let values = (0..len).map(|i| i as f32 / len as f32).collect();
        ArrayD::from_shape_vec(IxDyn(shape), values).unwrap()
    }

    #[test]
    fn every_rank_lifts_to_the_same_tensor() {
        let (plane, plane_layout) = mask_to_image(&ramp(&[3, 5])).unwrap();
        let (batched, batched_layout) = mask_to_image(&ramp(&[1, 3, 5])).unwrap();
        let (channeled, channeled_layout) = mask_to_image(&ramp(&[1, 3, 5, 1])).unwrap();

        assert_eq!(plane.shape(), &[1, 3, 5, 1]);
        assert_eq!(plane, batched);
        assert_eq!(batched, channeled);

        assert_eq!(plane_layout, MaskLayout::Plane);
        assert_eq!(batched_layout, MaskLayout::Batched);
        assert_eq!(channeled_layout, MaskLayout::Channeled);
    }

    #[test]
    fn batch_axis_is_preserved() {
        let (lifted, _) = mask_to_image(&ramp(&[4, 2, 2])).unwrap();
        assert_eq!(lifted.shape(), &[4, 2, 2, 1]);
    }

    #[test]
    fn values_are_clamped() {
        let mask = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![-0.5, 0.25, 1.0, 3.0]).unwrap();
        let (lifted, _) = mask_to_image(&mask).unwrap();
        let values: Vec<f32> = lifted.iter().copied().collect();
        assert_eq!(values, vec![0.0, 0.25, 1.0, 1.0]);
    }

    #[test]
    fn input_is_not_mutated() {
        let mask = ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![-1.0, 2.0]).unwrap();
        let before = mask.clone();
        let _ = mask_to_image(&mask).unwrap();
        assert_eq!(mask, before);
    }

    #[test]
    fn unsupported_rank_is_rejected() {
        let mask = ArrayD::<f32>::zeros(IxDyn(&[5]));
        assert!(matches!(mask_to_image(&mask), Err(FitError::Shape { .. })));
    }

    #[test]
    fn layout_display() {
        assert_eq!(MaskLayout::Plane.to_string(), "HW");
        assert_eq!(MaskLayout::Batched.to_string(), "BHW");
        assert_eq!(MaskLayout::Channeled.to_string(), "BHWC");
    }
}
