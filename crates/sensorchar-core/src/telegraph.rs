use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consts::{DEFAULT_TELEGRAPH_SIGMA, DEFAULT_TELEGRAPH_WINDOW};
use crate::error::{Result, SensorError};
use crate::frame::{common_shape, Frame, Roi};
use crate::stack::reduce::view_mean_var;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegraphConfig {
    /// Flag pixels above `mean + sigma·std` of the first frame.
    pub sigma: f64,
    /// Edge of the traced window.
    pub window: usize,
}

impl Default for TelegraphConfig {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_TELEGRAPH_SIGMA,
            window: DEFAULT_TELEGRAPH_WINDOW,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TelegraphResult {
    pub threshold: f64,
    /// (row, col) of flagged pixels, row-major.
    pub flagged: Vec<(usize, usize)>,
    /// Window anchored at the first flagged pixel, clamped to the frame.
    pub window: Option<Roi>,
    /// Window contents of every frame, in capture order.
    pub traces: Vec<Array2<f64>>,
    /// Per-pixel `max - min` over the stack.
    pub peak_to_peak: Array2<f64>,
}

impl TelegraphResult {
    /// Largest peak-to-peak swing among the flagged pixels.
    pub fn max_flagged_swing(&self) -> Option<f64> {
        self.flagged
            .iter()
            .map(|&(r, c)| self.peak_to_peak[[r, c]])
            .reduce(f64::max)
    }
}

/// Find bright outlier pixels in the first bias frame and trace them.
pub fn find_telegraph_pixels(frames: &[Frame], config: &TelegraphConfig) -> Result<TelegraphResult> {
    if frames.len() < 2 {
        return Err(SensorError::insufficient("telegraph trace", 2, frames.len()));
    }
    if config.window == 0 {
        return Err(SensorError::InvalidParameter("telegraph window must be > 0".into()));
    }
    let (rows, cols) = common_shape(frames, "telegraph trace")?;

    let first = &frames[0].data;
    let (mean, var) = view_mean_var(&first.view());
    let threshold = mean + config.sigma * var.sqrt();
    let flagged: Vec<(usize, usize)> = first
        .indexed_iter()
        .filter(|&(_, &v)| v > threshold)
        .map(|(idx, _)| idx)
        .collect();

    let window = flagged.first().map(|&(r, c)| {
        Roi::new(r, c, config.window.min(rows - r), config.window.min(cols - c))
    });
    let traces = match window {
        Some(roi) => frames
            .iter()
            .map(|f| roi.view(&f.data).map(|v| v.to_owned()))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let mut lo = first.clone();
    let mut hi = first.clone();
    for frame in &frames[1..] {
        Zip::from(&mut lo)
            .and(&mut hi)
            .and(&frame.data)
            .for_each(|l, h, &v| {
                *l = l.min(v);
                *h = h.max(v);
            });
    }
    let peak_to_peak = &hi - &lo;

    info!(
        frames = frames.len(),
        threshold,
        flagged = flagged.len(),
        "Telegraph pixels located"
    );
    Ok(TelegraphResult {
        threshold,
        flagged,
        window,
        traces,
        peak_to_peak,
    })
}
