//! Dimension extraction for image and mask tensors.
//!
//! This is step 1 of the pipeline: read the target size from the
//! reference image and the current size from the mask, rejecting any
//! tensor whose rank does not match one of the accepted layouts.

use ndarray::{ArrayBase, Dimension, RawData};

use crate::types::{Dimensions, FitError};

const IMAGE_LAYOUT: &str = "4 axes (batch, height, width, channel) with non-empty height and width";
const MASK_LAYOUT: &str = "2, 3 or 4 axes ((height, width), (batch, height, width) or \
                           (batch, height, width, 1)) with non-empty height and width";

/// Read `(height, width)` of an image tensor from axes 1 and 2.
///
/// # Errors
///
/// Returns [`FitError::Shape`] if the image does not have exactly four
/// axes or if its height or width is zero.
pub fn image_dimensions<S, D>(image: &ArrayBase<S, D>) -> Result<Dimensions, FitError>
where
    S: RawData,
    D: Dimension,
{
    let shape = image.shape();
    let &[_, height, width, _] = shape else {
        return Err(FitError::shape("image", shape, IMAGE_LAYOUT));
    };
    non_empty("image", shape, Dimensions::new(width, height), IMAGE_LAYOUT)
}

/// Read `(height, width)` of a mask tensor of rank 2, 3 or 4.
///
/// # Errors
///
/// Returns [`FitError::Shape`] for any other rank or if the mask's
/// height or width is zero.
pub fn mask_dimensions<S, D>(mask: &ArrayBase<S, D>) -> Result<Dimensions, FitError>
where
    S: RawData,
    D: Dimension,
{
    let shape = mask.shape();
    let dims = match *shape {
        [height, width] | [_, height, width] | [_, height, width, _] => {
            Dimensions::new(width, height)
        }
        _ => return Err(FitError::shape("mask", shape, MASK_LAYOUT)),
    };
    non_empty("mask", shape, dims, MASK_LAYOUT)
}

fn non_empty(
    tensor: &str,
    shape: &[usize],
    dims: Dimensions,
    expected: &str,
) -> Result<Dimensions, FitError> {
    if dims.is_empty() {
        Err(FitError::shape(tensor, shape, expected))
    } else {
        Ok(dims)
    }
}
