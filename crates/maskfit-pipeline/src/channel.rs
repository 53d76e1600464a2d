//! Image-to-mask lower: read one named channel out of an image tensor.
//!
//! Used twice by the pipeline: at step 4 to turn the resampled
//! mask-image back into a mask, and after compositing to read the
//! final mask back out of the preview image's alpha channel.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array3, ArrayBase, Axis, Data, Ix4};
use serde::{Deserialize, Serialize};

use crate::lift::clamp_unit;
use crate::types::FitError;

/// A named color channel of a `(batch, height, width, channel)` image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Channel index 0.
    Red,
    /// Channel index 1.
    Green,
    /// Channel index 2.
    Blue,
    /// Channel index 3.
    Alpha,
}

impl Channel {
    /// Every channel, in index order.
    pub const ALL: [Self; 4] = [Self::Red, Self::Green, Self::Blue, Self::Alpha];

    /// Position of this channel along the channel axis.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
            Self::Alpha => 3,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Alpha => "alpha",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.name() == s)
            .ok_or_else(|| FitError::Channel {
                channel: s.to_owned(),
                reason: "must be one of red, green, blue, alpha".to_owned(),
            })
    }
}

/// Extract `channel` from an image tensor as a `(batch, height, width)`
/// mask clamped to `[0, 1]`.
///
/// A single-channel tensor is treated as already holding the requested
/// signal: its sole channel is returned whatever `channel` names.
///
/// # Errors
///
/// Returns [`FitError::Channel`] if the tensor has more than one
/// channel but not enough to contain `channel`.
pub fn image_to_mask<S>(image: &ArrayBase<S, Ix4>, channel: Channel) -> Result<Array3<f32>, FitError>
where
    S: Data<Elem = f32>,
{
    let channels = image.len_of(Axis(3));
    let index = if channels == 1 {
        0
    } else if channel.index() < channels {
        channel.index()
    } else {
        return Err(FitError::Channel {
            channel: channel.name().to_owned(),
            reason: format!(
                "image has {channels} channels, cannot read index {}",
                channel.index()
            ),
        });
    };

    Ok(image.index_axis(Axis(3), index).mapv(clamp_unit))
}

/// [`image_to_mask`] with the channel given by name.
///
/// # Errors
///
/// Returns [`FitError::Channel`] if `name` is not one of `"red"`,
/// `"green"`, `"blue"`, `"alpha"`, or if the channel is not present.
pub fn image_to_mask_named<S>(image: &ArrayBase<S, Ix4>, name: &str) -> Result<Array3<f32>, FitError>
where
    S: Data<Elem = f32>,
{
    image_to_mask(image, name.parse()?)
}
