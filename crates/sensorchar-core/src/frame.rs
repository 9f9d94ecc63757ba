use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::{s, Array2, ArrayView2};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SensorError};

/// A single detector frame in ADU.
///
/// Pixel values are always `f64`. Raw integer samples are promoted on
/// construction, so frame arithmetic can never wrap around.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (rows, cols)
    pub data: Array2<f64>,
    /// Scalar header tags carried by the source file
    pub header: FrameHeader,
    /// File the frame was read from, if any
    pub source: Option<PathBuf>,
}

impl Frame {
    pub fn new(data: Array2<f64>) -> Self {
        Self {
            data,
            header: FrameHeader::default(),
            source: None,
        }
    }

    /// Promote a raw integer (or float) array to a frame.
    pub fn from_raw<T>(raw: &Array2<T>) -> Self
    where
        T: AsPrimitive<f64>,
    {
        Self::new(raw.mapv(|v| v.as_()))
    }

    pub fn with_header(mut self, header: FrameHeader) -> Self {
        self.header = header;
        self
    }

    pub fn with_source(mut self, path: &Path) -> Self {
        self.source = Some(path.to_path_buf());
        self
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn mean(&self) -> f64 {
        self.data.mean().unwrap_or(0.0)
    }

    /// Human-readable origin used in error messages.
    pub fn label(&self) -> String {
        self.source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }

    /// Read the grouping key `key` from the header.
    pub fn group_key(&self, key: &str) -> Result<GroupKey> {
        self.header
            .get(key)
            .map(GroupKey::from)
            .ok_or_else(|| SensorError::MissingMetadata {
                path: self.source.clone().unwrap_or_default(),
                key: key.to_string(),
            })
    }
}

/// A scalar header value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HeaderValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
        }
    }
}

/// Header tags in file order. Keyword lookup ignores case.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameHeader {
    entries: Vec<(String, HeaderValue)>,
}

impl FrameHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tag. Keywords are stored upper case.
    pub fn set(&mut self, key: &str, value: HeaderValue) {
        let key = key.trim().to_ascii_uppercase();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        let key = key.trim();
        let idx = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.entries.remove(idx).1)
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        let key = key.trim();
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Grouping key taken from a header tag.
///
/// Numeric keys order before text keys; numeric text such as `'1.5'` is
/// treated as a number so `1`, `1.0` and `'1'` are the same key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum GroupKey {
    Number(f64),
    Text(String),
}

impl GroupKey {
    pub fn number(v: f64) -> Self {
        // fold -0.0 into 0.0 so both land in one group
        Self::Number(if v == 0.0 { 0.0 } else { v })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

impl From<&HeaderValue> for GroupKey {
    fn from(value: &HeaderValue) -> Self {
        match value {
            HeaderValue::Bool(b) => Self::Text(if *b { "T" } else { "F" }.to_string()),
            HeaderValue::Text(s) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Self::number(v),
                _ => Self::Text(s.trim().to_string()),
            },
            other => Self::number(other.as_f64().unwrap_or(f64::NAN)),
        }
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Frames grouped by a header key, iterated in ascending key order.
///
/// Frames inside one group keep their insertion (capture) order.
#[derive(Clone, Debug, Default)]
pub struct FrameGroup {
    key: String,
    groups: BTreeMap<GroupKey, Vec<Frame>>,
}

impl FrameGroup {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            groups: BTreeMap::new(),
        }
    }

    /// Header tag this group was built from.
    pub fn key_name(&self) -> &str {
        &self.key
    }

    /// Append a frame to the group for `key`, rejecting shape changes.
    pub fn insert(&mut self, key: GroupKey, frame: Frame) -> Result<()> {
        if let Some(expected) = self.shape() {
            if frame.shape() != expected {
                return Err(SensorError::shape(
                    format!("group {}={} ({})", self.key, key, frame.label()),
                    expected,
                    frame.shape(),
                ));
            }
        }
        self.groups.entry(key).or_default().push(frame);
        Ok(())
    }

    pub fn get(&self, key: &GroupKey) -> Option<&[Frame]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &[Frame])> {
        self.groups.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.groups.keys()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of frames across all keys.
    pub fn frame_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Common frame shape, `None` when the group is empty.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.groups
            .values()
            .flat_map(|frames| frames.first())
            .map(Frame::shape)
            .next()
    }

    /// Numeric value of every key; text keys are rejected.
    pub fn numeric_keys(&self) -> Result<Vec<f64>> {
        self.groups
            .keys()
            .map(|k| {
                k.as_f64().ok_or_else(|| {
                    SensorError::InvalidParameter(format!(
                        "group key {}='{}' is not numeric",
                        self.key, k
                    ))
                })
            })
            .collect()
    }
}

/// Sub-rectangle of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub width: usize,
}

impl Roi {
    pub fn new(row: usize, col: usize, height: usize, width: usize) -> Self {
        Self {
            row,
            col,
            height,
            width,
        }
    }

    /// The whole frame.
    pub fn full((rows, cols): (usize, usize)) -> Self {
        Self::new(0, 0, rows, cols)
    }

    /// A `height`×`width` region centered on the frame, clamped to it.
    pub fn centered((rows, cols): (usize, usize), height: usize, width: usize) -> Self {
        let height = height.min(rows);
        let width = width.min(cols);
        Self::new((rows - height) / 2, (cols - width) / 2, height, width)
    }

    pub fn area(&self) -> usize {
        self.height * self.width
    }

    /// Whether the region lies inside a frame of the given shape.
    pub fn fits(&self, (rows, cols): (usize, usize)) -> bool {
        self.area() > 0 && self.row + self.height <= rows && self.col + self.width <= cols
    }

    pub fn view<'a>(&self, data: &'a Array2<f64>) -> Result<ArrayView2<'a, f64>> {
        if !self.fits(data.dim()) {
            return Err(SensorError::InvalidParameter(format!(
                "ROI {}x{} at ({}, {}) does not fit a {}x{} frame",
                self.height,
                self.width,
                self.row,
                self.col,
                data.nrows(),
                data.ncols()
            )));
        }
        Ok(data.slice(s![
            self.row..self.row + self.height,
            self.col..self.col + self.width
        ]))
    }
}

/// Check that every frame has the same shape and return it.
pub fn common_shape(frames: &[Frame], context: &str) -> Result<(usize, usize)> {
    let first = frames
        .first()
        .ok_or_else(|| SensorError::insufficient(context, 1, 0))?;
    let expected = first.shape();
    for frame in &frames[1..] {
        if frame.shape() != expected {
            return Err(SensorError::shape(
                format!("{context} ({})", frame.label()),
                expected,
                frame.shape(),
            ));
        }
    }
    Ok(expected)
}
