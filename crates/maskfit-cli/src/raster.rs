//! Conversion between image files and pipeline tensors.
//!
//! Decoded images become `(1, height, width, channel)` tensors with
//! values in `[0, 1]`; masks become `(height, width)` planes. Only the
//! first batch entry is written back out.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbaImage};
use ndarray::{Array2, Array4, ArrayD, ArrayView3, ArrayView4};

use crate::error::CliError;

/// Which signal of a decoded mask file becomes the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MaskSource {
    /// Perceptual luminance of the color channels.
    Luma,
    /// The red channel.
    Red,
    /// The green channel.
    Green,
    /// The blue channel.
    Blue,
    /// The alpha channel (opaque where the file has none).
    Alpha,
}

impl MaskSource {
    const fn rgba_index(self) -> Option<usize> {
        match self {
            Self::Luma => None,
            Self::Red => Some(0),
            Self::Green => Some(1),
            Self::Blue => Some(2),
            Self::Alpha => Some(3),
        }
    }
}

/// Decode the image at `path`.
///
/// # Errors
///
/// Returns [`CliError::Image`] if the file cannot be read or decoded.
pub fn open(path: &Path) -> Result<DynamicImage, CliError> {
    image::open(path).map_err(|source| CliError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Convert a decoded image into a `(1, height, width, channel)` tensor.
///
/// Images with alpha keep four channels, grayscale images without alpha
/// keep one, and everything else becomes RGB.
///
/// # Errors
///
/// Returns [`CliError::Tensor`] if the pixel buffer does not match the
/// image dimensions.
pub fn image_tensor(image: &DynamicImage) -> Result<ArrayD<f32>, CliError> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let color = image.color();
    let (channels, samples) = if color.has_alpha() {
        (4, image.to_rgba32f().into_raw())
    } else if color.has_color() {
        (3, image.to_rgb32f().into_raw())
    } else {
        (1, image.to_luma32f().into_raw())
    };
    let tensor = Array4::from_shape_vec((1, height, width, channels), samples)?;
    Ok(tensor.into_dyn())
}

/// Convert a decoded mask file into a `(height, width)` mask.
///
/// # Errors
///
/// Returns [`CliError::Tensor`] if the pixel buffer does not match the
/// image dimensions.
pub fn mask_tensor(image: &DynamicImage, source: MaskSource) -> Result<ArrayD<f32>, CliError> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let plane = match source.rgba_index() {
        None => Array2::from_shape_vec((height, width), image.to_luma32f().into_raw())?,
        Some(index) => {
            let rgba = image.to_rgba32f().into_raw();
            Array2::from_shape_fn((height, width), |(y, x)| rgba[(y * width + x) * 4 + index])
        }
    };
    Ok(plane.into_dyn())
}

/// Write the first mask of a `(batch, height, width)` tensor as an
/// 8-bit grayscale image.
///
/// # Errors
///
/// Returns [`CliError::Image`] if encoding or writing fails.
pub fn save_mask(mask: ArrayView3<'_, f32>, path: &Path) -> Result<(), CliError> {
    let (_, height, width) = mask.dim();
    let (w, h) = image_size(width, height)?;
    let image = GrayImage::from_fn(w, h, |x, y| {
        image::Luma([to_u8(mask[[0, y as usize, x as usize]])])
    });
    image.save(path).map_err(|source| CliError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the first image of a `(batch, height, width, 4)` tensor as an
/// 8-bit RGBA image.
///
/// # Errors
///
/// Returns [`CliError::Image`] if encoding or writing fails, including
/// when the file format cannot hold alpha.
pub fn save_preview(preview: ArrayView4<'_, f32>, path: &Path) -> Result<(), CliError> {
    let (_, height, width, _) = preview.dim();
    let (w, h) = image_size(width, height)?;
    let image = RgbaImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as usize, y as usize);
        image::Rgba(std::array::from_fn(|c| to_u8(preview[[0, y, x, c]])))
    });
    image.save(path).map_err(|source| CliError::Image {
        path: path.to_path_buf(),
        source,
    })
}

fn image_size(width: usize, height: usize) -> Result<(u32, u32), CliError> {
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(CliError::TooLarge { width, height }),
    }
}

/// Quantize a `[0, 1]` sample to 8 bits.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
