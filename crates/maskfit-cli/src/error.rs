//! Errors surfaced by the `maskfit` command.

use std::path::PathBuf;

use maskfit_pipeline::FitError;

/// Errors that can occur while loading, fitting or writing files.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The pipeline rejected its inputs.
    #[error(transparent)]
    Fit(#[from] FitError),

    /// An image file could not be decoded or encoded.
    #[error("{}: {source}", path.display())]
    Image {
        /// The file being read or written.
        path: PathBuf,
        /// Underlying codec error.
        source: image::ImageError,
    },

    /// Pixel data did not fit the tensor shape derived from it.
    #[error("tensor shape error: {0}")]
    Tensor(#[from] ndarray::ShapeError),

    /// `--config-json` could not be parsed, or output could not be
    /// serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A tensor was too large for an image file.
    #[error("image of {width}x{height} is too large to encode")]
    TooLarge {
        /// Tensor width.
        width: usize,
        /// Tensor height.
        height: usize,
    },
}
