use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, SensorError};
use crate::frame::{common_shape, Frame, FrameGroup};
use crate::io::fits::{load_fits, FitsReader};
use crate::io::image_io::load_image;

/// Extensions read through the FITS codec.
pub const FITS_EXTENSIONS: &[&str] = &["fit", "fits", "fts"];

/// Extensions read through the `image` crate (no header tags).
pub const IMAGE_EXTENSIONS: &[&str] = &["tif", "tiff", "png"];

/// A directory of frame files.
///
/// Every call re-reads the directory; the store keeps no frame buffers of its
/// own, so two stores over the same directory never share state.
#[derive(Clone, Debug)]
pub struct FrameStore {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl FrameStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extensions: FITS_EXTENSIONS
                .iter()
                .chain(IMAGE_EXTENSIONS)
                .map(|e| e.to_string())
                .collect(),
        }
    }

    /// Restrict the accepted file extensions (case-insensitive, without dot).
    pub fn with_extensions<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        self.extensions = extensions
            .iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Frame files in capture order.
    ///
    /// Names are compared by prefix, then by the trailing number of the stem
    /// (`bias-2` before `bias-10`), then by full name.
    pub fn paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && self.accepts(&path) {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| capture_order(a, b));
        Ok(paths)
    }

    /// Load every frame, checking that all share one shape.
    pub fn load(&self) -> Result<Vec<Frame>> {
        let paths = self.non_empty_paths()?;
        let frames = paths
            .iter()
            .map(|p| load_frame(p))
            .collect::<Result<Vec<_>>>()?;
        let (rows, cols) = common_shape(&frames, &self.dir.display().to_string())?;
        info!(
            dir = %self.dir.display(),
            frames = frames.len(),
            rows,
            cols,
            "Frames loaded"
        );
        Ok(frames)
    }

    /// Load every frame grouped by the header tag `key`.
    ///
    /// A frame without the tag is an error, never skipped.
    pub fn load_grouped(&self, key: &str) -> Result<FrameGroup> {
        let paths = self.non_empty_paths()?;
        let mut group = FrameGroup::new(key);
        for path in &paths {
            let frame = load_frame(path)?;
            let group_key = frame.group_key(key)?;
            debug!(path = %path.display(), key, value = %group_key, "Grouping frame");
            group.insert(group_key, frame)?;
        }
        info!(
            dir = %self.dir.display(),
            key,
            groups = group.len(),
            frames = group.frame_count(),
            "Frames grouped"
        );
        Ok(group)
    }

    /// Decode frames one at a time, in capture order.
    pub fn stream(&self) -> Result<FrameStream> {
        let paths = self.non_empty_paths()?;
        Ok(FrameStream {
            paths: paths.into_iter(),
            shape: None,
        })
    }

    /// Bytes needed to hold every frame of the store decoded as `f64`.
    ///
    /// Only FITS headers are read; image files are decoded to find their size.
    pub fn decoded_bytes(&self) -> Result<usize> {
        let mut total = 0;
        for path in self.non_empty_paths()? {
            let (rows, cols) = if is_fits(&path) {
                FitsReader::open(&path)?.shape()
            } else {
                load_image(&path)?.shape()
            };
            total += rows * cols * std::mem::size_of::<f64>();
        }
        Ok(total)
    }

    fn non_empty_paths(&self) -> Result<Vec<PathBuf>> {
        let paths = self.paths()?;
        if paths.is_empty() {
            return Err(SensorError::EmptySource {
                path: self.dir.clone(),
            });
        }
        Ok(paths)
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

/// Lazy frame iterator returned by [`FrameStore::stream`].
pub struct FrameStream {
    paths: std::vec::IntoIter<PathBuf>,
    shape: Option<(usize, usize)>,
}

impl Iterator for FrameStream {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        let frame = match load_frame(&path) {
            Ok(f) => f,
            Err(e) => return Some(Err(e)),
        };
        match self.shape {
            Some(expected) if expected != frame.shape() => Some(Err(SensorError::shape(
                format!("stream ({})", path.display()),
                expected,
                frame.shape(),
            ))),
            _ => {
                self.shape = Some(frame.shape());
                Some(Ok(frame))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

/// Load a single frame file, choosing the codec from its extension.
pub fn load_frame(path: &Path) -> Result<Frame> {
    if is_fits(path) {
        load_fits(path)
    } else {
        load_image(path)
    }
}

/// Whether `path` has one of the FITS extensions.
pub fn is_fits(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FITS_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn capture_order(a: &Path, b: &Path) -> Ordering {
    let (pa, na) = split_trailing_number(a);
    let (pb, nb) = split_trailing_number(b);
    pa.cmp(&pb)
        .then(na.cmp(&nb))
        .then_with(|| a.file_name().cmp(&b.file_name()))
}

fn split_trailing_number(path: &Path) -> (String, Option<u64>) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (prefix, number) = stem.split_at(stem.len() - digits);
    (prefix.to_string(), number.parse().ok())
}
