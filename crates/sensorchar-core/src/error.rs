use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("No frame files found in {}", path.display())]
    EmptySource { path: PathBuf },

    #[error("Shape mismatch in {context}: expected {}x{}, found {}x{}", expected.0, expected.1, found.0, found.1)]
    ShapeMismatch {
        context: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Insufficient data for {what}: need at least {needed}, got {found}")]
    InsufficientData {
        what: String,
        needed: usize,
        found: usize,
    },

    #[error("Header tag '{key}' missing from {}", path.display())]
    MissingMetadata { path: PathBuf, key: String },

    #[error("Degenerate fit: {0}")]
    FitDegenerate(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, SensorError>;

impl SensorError {
    pub(crate) fn insufficient(what: impl Into<String>, needed: usize, found: usize) -> Self {
        Self::InsufficientData {
            what: what.into(),
            needed,
            found,
        }
    }

    pub(crate) fn shape(
        context: impl Into<String>,
        expected: (usize, usize),
        found: (usize, usize),
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}
