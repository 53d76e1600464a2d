//! Latent structures and projection of a fitted mask onto latent space.
//!
//! Step 6 of the pipeline (optional). The mask is resampled to the
//! spatial size of the latent's `"samples"` tensor, read from the tensor
//! itself rather than derived from the image size, and attached as
//! `"noise_mask"` on a copy of the latent.

use std::collections::BTreeMap;

use ndarray::{ArcArray, Array3, ArrayBase, ArrayD, Axis, Data, Ix3, IxDyn};

use crate::resample::{ResampleMethod, interpolate};
use crate::types::{Dimensions, FitError};

/// Key of the latent tensor entry, `(batch, channel, height, width)`.
pub const SAMPLES_KEY: &str = "samples";

/// Key under which the projected mask is stored.
pub const NOISE_MASK_KEY: &str = "noise_mask";

/// A single value stored in a [`Latent`].
#[derive(Debug, Clone, PartialEq)]
pub enum LatentEntry {
    /// A reference-counted tensor. Cloning shares the storage.
    Tensor(ArcArray<f32, IxDyn>),
    /// Integer metadata such as per-sample batch indices.
    Indices(Vec<i64>),
}

impl LatentEntry {
    /// The tensor held by this entry, if it is one.
    #[must_use]
    pub const fn as_tensor(&self) -> Option<&ArcArray<f32, IxDyn>> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            Self::Indices(_) => None,
        }
    }
}

impl From<ArrayD<f32>> for LatentEntry {
    fn from(tensor: ArrayD<f32>) -> Self {
        Self::Tensor(tensor.into_shared())
    }
}

impl From<Vec<i64>> for LatentEntry {
    fn from(indices: Vec<i64>) -> Self {
        Self::Indices(indices)
    }
}

/// A named collection of latent-space entries.
///
/// Only `"samples"` is required by the pipeline; every other entry is
/// carried through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Latent {
    entries: BTreeMap<String, LatentEntry>,
}

impl Latent {
    /// Create a latent holding only a `"samples"` tensor.
    #[must_use]
    pub fn from_samples(samples: ArrayD<f32>) -> Self {
        let mut latent = Self::default();
        latent.insert(SAMPLES_KEY, samples);
        latent
    }

    /// Insert an entry, returning the previous value under `key`.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        entry: impl Into<LatentEntry>,
    ) -> Option<LatentEntry> {
        self.entries.insert(key.into(), entry.into())
    }

    /// Look up an entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&LatentEntry> {
        self.entries.get(key)
    }

    /// Returns `true` if an entry exists under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Entry keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the latent has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `"samples"` tensor.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::LatentFormat`] if the entry is missing or is
    /// not a tensor.
    pub fn samples(&self) -> Result<&ArcArray<f32, IxDyn>, FitError> {
        match self.entries.get(SAMPLES_KEY) {
            Some(LatentEntry::Tensor(samples)) => Ok(samples),
            Some(LatentEntry::Indices(_)) => Err(FitError::LatentFormat(format!(
                "'{SAMPLES_KEY}' entry is not a tensor"
            ))),
            None => Err(FitError::LatentFormat(format!(
                "missing '{SAMPLES_KEY}' entry"
            ))),
        }
    }

    /// Spatial size of the `"samples"` tensor, read from its last two axes.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::LatentFormat`] if `"samples"` is missing, is
    /// not a 4-axis tensor, or has an empty spatial axis.
    pub fn latent_dimensions(&self) -> Result<Dimensions, FitError> {
        let samples = self.samples()?;
        let &[_, _, height, width] = samples.shape() else {
            return Err(FitError::LatentFormat(format!(
                "'{SAMPLES_KEY}' has shape {:?}, expected (batch, channel, height, width)",
                samples.shape()
            )));
        };
        let dims = Dimensions::new(width, height);
        if dims.is_empty() {
            return Err(FitError::LatentFormat(format!(
                "'{SAMPLES_KEY}' has an empty spatial axis: {:?}",
                samples.shape()
            )));
        }
        Ok(dims)
    }

    /// The attached noise mask, if any.
    #[must_use]
    pub fn noise_mask(&self) -> Option<&ArcArray<f32, IxDyn>> {
        self.entries.get(NOISE_MASK_KEY).and_then(LatentEntry::as_tensor)
    }

    /// A copy of this latent with `"noise_mask"` set to `mask`.
    ///
    /// The copy is shallow: tensor entries share storage with `self`,
    /// which is left unchanged.
    #[must_use]
    pub fn with_noise_mask(&self, mask: Array3<f32>) -> Self {
        let mut copy = self.clone();
        copy.insert(NOISE_MASK_KEY, mask.into_dyn());
        copy
    }
}

impl<K: Into<String>, V: Into<LatentEntry>> FromIterator<(K, V)> for Latent {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Resample a `(batch, height, width)` mask to `target`.
///
/// A channel axis is inserted at position 1 around the shared
/// [`interpolate`] primitive. When the mask already has the target size
/// its values are returned unchanged. The second element reports
/// whether resampling was applied.
///
/// # Errors
///
/// Returns [`FitError::Shape`] if `target` or the mask has an empty
/// spatial axis.
pub fn scale_mask_for_latent<S>(
    mask: &ArrayBase<S, Ix3>,
    target: Dimensions,
    method: ResampleMethod,
) -> Result<(Array3<f32>, bool), FitError>
where
    S: Data<Elem = f32>,
{
    let (_, height, width) = mask.dim();
    if height == target.height && width == target.width {
        return Ok((mask.to_owned(), false));
    }

    let with_channel = mask.view().insert_axis(Axis(1));
    let scaled = interpolate(&with_channel, target, method)?;
    Ok((scaled.index_axis_move(Axis(1), 0), true))
}

/// Attach `mask`, projected to the latent's resolution, to a copy of
/// `latent` under `"noise_mask"`.
///
/// All other entries are preserved; an existing `"noise_mask"` is
/// replaced in the copy. `latent` itself is never modified. The second
/// element reports whether the mask had to be resampled.
///
/// # Errors
///
/// Returns [`FitError::LatentFormat`] if `latent` has no usable
/// `"samples"` tensor.
pub fn apply_mask_to_latent<S>(
    latent: &Latent,
    mask: &ArrayBase<S, Ix3>,
    method: ResampleMethod,
) -> Result<(Latent, bool), FitError>
where
    S: Data<Elem = f32>,
{
    let target = latent.latent_dimensions()?;
    let (projected, applied) = scale_mask_for_latent(mask, target, method)?;
    Ok((latent.with_noise_mask(projected), applied))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::s;

    use super::*;

    fn samples(batch: usize, height: usize, width: usize) -> ArrayD<f32> {
        ArrayD::zeros(IxDyn(&[batch, 4, height, width]))
    }

    #[test]
    fn latent_dimensions_read_last_two_axes() {
        let latent = Latent::from_samples(samples(1, 48, 64));
        assert_eq!(latent.latent_dimensions().unwrap(), Dimensions::new(64, 48));
    }

    #[test]
    fn missing_samples_is_a_format_error() {
        let latent: Latent = [("batch_index", vec![0_i64])].into_iter().collect();
        let mask = Array3::<f32>::zeros((1, 8, 8));
        let result = apply_mask_to_latent(&latent, &mask, ResampleMethod::NearestExact);
        assert!(matches!(result, Err(FitError::LatentFormat(_))));
    }

    #[test]
    fn non_tensor_samples_is_a_format_error() {
        let latent: Latent = [(SAMPLES_KEY, vec![1_i64, 2])].into_iter().collect();
        assert!(matches!(latent.samples(), Err(FitError::LatentFormat(_))));
    }

    #[test]
    fn three_axis_samples_is_a_format_error() {
        let latent = Latent::from_samples(ArrayD::zeros(IxDyn(&[4, 8, 8])));
        assert!(matches!(
            latent.latent_dimensions(),
            Err(FitError::LatentFormat(_))
        ));
    }

    #[test]
    fn projection_reaches_latent_size() {
        let latent = Latent::from_samples(samples(1, 64, 64));
        let mask = Array3::<f32>::ones((1, 512, 512));

        let (masked, applied) =
            apply_mask_to_latent(&latent, &mask, ResampleMethod::NearestExact).unwrap();

        assert!(applied);
        let noise_mask = masked.noise_mask().unwrap();
        assert_eq!(noise_mask.shape(), &[1, 64, 64]);
        assert!(noise_mask.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn projection_leaves_caller_latent_unchanged() {
        let mut latent = Latent::from_samples(samples(2, 8, 8));
        latent.insert("batch_index", vec![3_i64, 4]);
        let before = latent.clone();
        let mask = Array3::<f32>::ones((2, 64, 64));

        let (masked, _) =
            apply_mask_to_latent(&latent, &mask, ResampleMethod::NearestExact).unwrap();

        assert_eq!(latent, before);
        assert!(!latent.contains_key(NOISE_MASK_KEY));
        assert_eq!(masked.len(), 3);
        assert_eq!(masked.get("batch_index"), latent.get("batch_index"));
        assert_eq!(
            masked.samples().unwrap().as_ptr(),
            latent.samples().unwrap().as_ptr(),
            "samples should be shared, not copied",
        );
    }

    #[test]
    fn existing_noise_mask_is_replaced_in_copy() {
        let mut latent = Latent::from_samples(samples(1, 4, 4));
        latent.insert(NOISE_MASK_KEY, ArrayD::<f32>::zeros(IxDyn(&[1, 4, 4])));
        let mask = Array3::<f32>::ones((1, 4, 4));

        let (masked, applied) =
            apply_mask_to_latent(&latent, &mask, ResampleMethod::NearestExact).unwrap();

        assert!(!applied);
        assert!(masked.noise_mask().unwrap().iter().all(|&v| v == 1.0));
        assert!(latent.noise_mask().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn same_size_mask_is_copied_verbatim() {
        let mask = Array3::from_shape_fn((1, 3, 3), |(_, y, x)| {
            #[allow(clippy::cast_precision_loss)]
            let v = (y * 3 + x) as f32 / 9.0;
            v
        });
        let (scaled, applied) =
            scale_mask_for_latent(&mask, Dimensions::new(3, 3), ResampleMethod::Bilinear).unwrap();
        assert!(!applied);
        assert_eq!(scaled, mask);
    }

    #[test]
    fn non_square_latent_projection() {
        let mask = Array3::from_shape_fn((1, 4, 8), |(_, _, x)| if x < 4 { 0.0 } else { 1.0 });
        let (scaled, _) =
            scale_mask_for_latent(&mask, Dimensions::new(4, 2), ResampleMethod::NearestExact)
                .unwrap();
        assert_eq!(scaled.shape(), &[1, 2, 4]);
        assert_eq!(scaled.slice(s![0, 0, ..]).to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
    }
}
