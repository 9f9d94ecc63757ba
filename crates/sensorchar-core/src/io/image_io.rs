use std::path::Path;

use ndarray::Array2;

use crate::error::{Result, SensorError};
use crate::frame::Frame;

/// Load a grayscale TIFF/PNG as raw ADU.
///
/// These formats carry no header tags, so the returned frame has an empty
/// header and cannot be grouped by key.
pub fn load_image(path: &Path) -> Result<Frame> {
    let img = image::open(path)?;
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();

    let raw = Array2::from_shape_vec((h as usize, w as usize), gray.into_raw())
        .map_err(|e| SensorError::InvalidParameter(format!("{}: {e}", path.display())))?;

    Ok(Frame::from_raw(&raw).with_source(path))
}
