//! Spatial resampling of image-layout and channel-first tensors.
//!
//! Step 3 of the pipeline scales the lifted mask-image to the reference
//! image size; step 6 reuses the same primitive at latent resolution.
//!
//! [`interpolate`] works on `(batch, channel, height, width)` tensors.
//! [`scale_image`] wraps it for `(batch, height, width, channel)`
//! tensors and returns its input untouched when the size already
//! matches, so an already-fitted mask keeps its exact values.

use std::fmt;

use image::imageops::FilterType;
use image::{ImageBuffer, Luma};
use ndarray::{Array2, Array4, ArrayBase, Data, Ix4, s};
use serde::{Deserialize, Serialize};

use crate::lift::clamp_unit;
use crate::types::{Dimensions, FitError};

/// Interpolation policy used when a tensor is resized.
///
/// The nearest variants copy source samples verbatim, so a binary mask
/// stays binary. The smoothing variants introduce fractional values at
/// hard edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleMethod {
    /// Nearest neighbor sampled at pixel centers: destination index `d`
    /// reads source index `floor((d + 0.5) * in / out)`.
    #[default]
    NearestExact,
    /// Legacy nearest neighbor: destination index `d` reads source
    /// index `floor(d * in / out)`, which biases towards the top-left.
    Nearest,
    /// Bilinear interpolation with half-pixel centers and no corner
    /// alignment.
    Bilinear,
    /// Bicubic (Catmull-Rom) filtering.
    Bicubic,
    /// Lanczos filtering with 3 lobes.
    Lanczos3,
}

impl ResampleMethod {
    /// The `image` crate filter implementing this method, if it is
    /// delegated rather than sampled directly.
    const fn to_image_filter(self) -> Option<FilterType> {
        match self {
            Self::NearestExact | Self::Nearest | Self::Bilinear => None,
            Self::Bicubic => Some(FilterType::CatmullRom),
            Self::Lanczos3 => Some(FilterType::Lanczos3),
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NearestExact => f.write_str("nearest-exact"),
            Self::Nearest => f.write_str("nearest"),
            Self::Bilinear => f.write_str("bilinear"),
            Self::Bicubic => f.write_str("bicubic"),
            Self::Lanczos3 => f.write_str("lanczos3"),
        }
    }
}

/// Scale a `(batch, height, width, channel)` tensor to `target`.
///
/// Batch and channel counts are preserved. Returns the (possibly
/// unchanged) tensor and whether resampling was actually applied; when
/// the spatial size already equals `target` the input is handed back
/// as-is, without reinterpolation.
///
/// # Errors
///
/// Returns [`FitError::Shape`] if `target` or the input has an empty
/// spatial axis.
pub fn scale_image(
    image: Array4<f32>,
    target: Dimensions,
    method: ResampleMethod,
) -> Result<(Array4<f32>, bool), FitError> {
    let (_, height, width, _) = image.dim();
    if height == target.height && width == target.width {
        return Ok((image, false));
    }

    let channels_first = image.view().permuted_axes([0, 3, 1, 2]);
    let scaled = interpolate(&channels_first, target, method)?;
    let channels_last = scaled.permuted_axes([0, 2, 3, 1]);
    Ok((channels_last.as_standard_layout().into_owned(), true))
}

/// Resize a `(batch, channel, height, width)` tensor to `target`.
///
/// Always produces a new tensor; callers wanting the no-op
/// short-circuit compare sizes first (see [`scale_image`]).
///
/// # Errors
///
/// Returns [`FitError::Shape`] if `target` or the input has an empty
/// spatial axis, or if a delegated filter cannot represent the sizes.
pub fn interpolate<S>(
    input: &ArrayBase<S, Ix4>,
    target: Dimensions,
    method: ResampleMethod,
) -> Result<Array4<f32>, FitError>
where
    S: Data<Elem = f32>,
{
    let (batch, channels, in_h, in_w) = input.dim();
    if in_h == 0 || in_w == 0 {
        return Err(FitError::shape(
            "resample input",
            input.shape(),
            "non-empty height and width",
        ));
    }
    if target.is_empty() {
        return Err(FitError::shape(
            "resample target",
            &[target.height, target.width],
            "non-empty height and width",
        ));
    }

    if let Some(filter) = method.to_image_filter() {
        return filter_planes(input, target, filter);
    }

    let shape = (batch, channels, target.height, target.width);
    let output = match method {
        ResampleMethod::Bilinear => {
            let ys = linear_taps(in_h, target.height);
            let xs = linear_taps(in_w, target.width);
            Array4::from_shape_fn(shape, |(n, c, y, x)| {
                let (y0, y1, wy) = ys[y];
                let (x0, x1, wx) = xs[x];
                let top = lerp(input[[n, c, y0, x0]], input[[n, c, y0, x1]], wx);
                let bottom = lerp(input[[n, c, y1, x0]], input[[n, c, y1, x1]], wx);
                lerp(top, bottom, wy)
            })
        }
        _ => {
            let exact = method == ResampleMethod::NearestExact;
            let ys = nearest_indices(in_h, target.height, exact);
            let xs = nearest_indices(in_w, target.width, exact);
            Array4::from_shape_fn(shape, |(n, c, y, x)| input[[n, c, ys[y], xs[x]]])
        }
    };
    Ok(output)
}

/// Source index for each destination index under nearest sampling.
///
/// With `exact`, destination pixel centers are mapped
/// (`(d + 0.5) * scale`); otherwise destination corners are (`d * scale`).
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn nearest_indices(in_size: usize, out_size: usize, exact: bool) -> Vec<usize> {
    let scale = in_size as f32 / out_size as f32;
    let offset = if exact { 0.5 } else { 0.0 };
    (0..out_size)
        .map(|d| {
            let src = ((d as f32 + offset) * scale).floor() as usize;
            src.min(in_size - 1)
        })
        .collect()
}

/// Lower index, upper index and upper weight for each destination
/// index under bilinear sampling with half-pixel centers.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn linear_taps(in_size: usize, out_size: usize) -> Vec<(usize, usize, f32)> {
    let scale = in_size as f32 / out_size as f32;
    (0..out_size)
        .map(|d| {
            let src = (d as f32 + 0.5).mul_add(scale, -0.5).max(0.0);
            let lo = (src.floor() as usize).min(in_size - 1);
            let hi = (lo + 1).min(in_size - 1);
            let weight = if hi == lo { 0.0 } else { src - lo as f32 };
            (lo, hi, weight)
        })
        .collect()
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (b - a).mul_add(t, a)
}

/// Resize every `(batch, channel)` plane with an `image` crate filter.
///
/// Filtering runs on `f32` samples. Ringing from the filter kernels is
/// clamped back into `[0, 1]`.
fn filter_planes<S>(
    input: &ArrayBase<S, Ix4>,
    target: Dimensions,
    filter: FilterType,
) -> Result<Array4<f32>, FitError>
where
    S: Data<Elem = f32>,
{
    let (batch, channels, in_h, in_w) = input.dim();
    let src_w = plane_axis(in_w, input.shape())?;
    let src_h = plane_axis(in_h, input.shape())?;
    let dst_w = plane_axis(target.width, input.shape())?;
    let dst_h = plane_axis(target.height, input.shape())?;

    let mut output = Array4::<f32>::zeros((batch, channels, target.height, target.width));
    for n in 0..batch {
        for c in 0..channels {
            let samples: Vec<f32> = input.slice(s![n, c, .., ..]).iter().copied().collect();
            let plane = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(src_w, src_h, samples)
                .ok_or_else(|| {
                    FitError::shape("resample input", input.shape(), "contiguous planes")
                })?;
            let resized = image::imageops::resize(&plane, dst_w, dst_h, filter);
            let resized: Vec<f32> = resized.into_raw().into_iter().map(clamp_unit).collect();
            let resized = Array2::from_shape_vec((target.height, target.width), resized)
                .map_err(|_| {
                    FitError::shape(
                        "resample output",
                        &[target.height, target.width],
                        "one sample per target pixel",
                    )
                })?;
            output.slice_mut(s![n, c, .., ..]).assign(&resized);
        }
    }
    Ok(output)
}

fn plane_axis(len: usize, shape: &[usize]) -> Result<u32, FitError> {
    u32::try_from(len)
        .map_err(|_| FitError::shape("resample input", shape, "spatial axes below 2^32 pixels"))
}
