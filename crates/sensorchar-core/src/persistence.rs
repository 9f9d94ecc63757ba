use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SensorError};
use crate::frame::Frame;
use crate::series::MetricSeries;

/// Mean level of a bias sequence over time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceResult {
    /// (elapsed seconds, mean ADU) per frame.
    pub series: MetricSeries,
    pub first: f64,
    pub last: f64,
    pub min: f64,
    pub max: f64,
    /// `first - last`; positive when residual charge drains away.
    pub decay: f64,
}

/// Record the mean of each frame as it arrives, `interval` seconds apart.
///
/// Frames are consumed one at a time and dropped before the next is read,
/// so a [`FrameStream`](crate::io::store::FrameStream) of any length runs
/// in the memory of a single frame.
pub fn track_persistence<I>(frames: I, interval: f64) -> Result<PersistenceResult>
where
    I: IntoIterator<Item = Result<Frame>>,
{
    if !(interval > 0.0) {
        return Err(SensorError::InvalidParameter(format!(
            "frame interval must be > 0, got {interval}"
        )));
    }

    let mut means = Vec::new();
    for (i, frame) in frames.into_iter().enumerate() {
        let mean = frame?.mean();
        debug!(frame = i, mean, "Persistence sample");
        means.push(mean);
    }

    let (Some(&first), Some(&last)) = (means.first(), means.last()) else {
        return Err(SensorError::insufficient("persistence frames", 1, 0));
    };
    let min = means.iter().copied().fold(f64::INFINITY, f64::min);
    let max = means.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let series = MetricSeries::from_points(
        "elapsed [s]",
        "mean [ADU]",
        means.iter().enumerate().map(|(i, &m)| (i as f64 * interval, m)),
    )?;

    info!(frames = means.len(), first, last, decay = first - last, "Persistence tracked");
    Ok(PersistenceResult {
        series,
        first,
        last,
        min,
        max,
        decay: first - last,
    })
}
