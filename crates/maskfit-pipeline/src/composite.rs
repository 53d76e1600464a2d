//! Alpha composite: attach a mask to a source image as its alpha channel.
//!
//! Step 5 of the pipeline. The composited image is what downstream
//! consumers see, and the final mask is read back out of its alpha
//! channel so both carry identical values.

use std::fmt;

use ndarray::{Array4, ArrayBase, Axis, Data, Ix3, Ix4};
use serde::{Deserialize, Serialize};

use crate::types::FitError;

/// How the color part of the composited image was derived from the
/// source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlphaMode {
    /// RGB source: the mask was appended as a fourth channel.
    Appended,
    /// RGBA source: the existing alpha was discarded and replaced.
    Replaced,
    /// Any other channel count: channels were cycled up to RGB
    /// (channel `k` reads source channel `k mod C`) before appending.
    Expanded,
}

impl AlphaMode {
    /// The mode used for a source image with `channels` channels.
    #[must_use]
    pub const fn for_channels(channels: usize) -> Self {
        match channels {
            3 => Self::Appended,
            4 => Self::Replaced,
            _ => Self::Expanded,
        }
    }
}

impl fmt::Display for AlphaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Appended => f.write_str("appended"),
            Self::Replaced => f.write_str("replaced"),
            Self::Expanded => f.write_str("expanded"),
        }
    }
}

/// Combine the color channels of `image` with `mask` as alpha, producing
/// a `(batch, height, width, 4)` image.
///
/// `mask` is `(batch, height, width)`. Its spatial size must equal the
/// image's; a mask batch of 1 is broadcast across the image batch.
/// See [`AlphaMode`] for how each source channel count is handled. The
/// source image is only read.
///
/// # Errors
///
/// Returns [`FitError::DimensionMismatch`] if the spatial sizes differ
/// or the batches are neither equal nor broadcastable.
/// Returns [`FitError::Shape`] if the image has no channels.
pub fn merge_alpha<S, T>(
    image: &ArrayBase<S, Ix4>,
    mask: &ArrayBase<T, Ix3>,
) -> Result<Array4<f32>, FitError>
where
    S: Data<Elem = f32>,
    T: Data<Elem = f32>,
{
    let (batch, height, width, channels) = image.dim();
    let (mask_batch, mask_height, mask_width) = mask.dim();

    if (mask_height, mask_width) != (height, width) || (mask_batch != batch && mask_batch != 1) {
        return Err(FitError::DimensionMismatch {
            mask: mask.shape().to_vec(),
            image: image.shape().to_vec(),
        });
    }
    if channels == 0 {
        return Err(FitError::shape(
            "image",
            image.shape(),
            "at least one channel",
        ));
    }

    let alpha = mask
        .broadcast((batch, height, width))
        .ok_or_else(|| FitError::DimensionMismatch {
            mask: mask.shape().to_vec(),
            image: image.shape().to_vec(),
        })?;

    let alpha_index = 3;
    let mut merged = Array4::from_shape_fn((batch, height, width, 4), |(n, y, x, c)| {
        if c == alpha_index {
            0.0
        } else {
            image[[n, y, x, c % channels]]
        }
    });
    merged.index_axis_mut(Axis(3), alpha_index).assign(&alpha);
    Ok(merged)
}
