use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SensorError};
use crate::fit::{fit, FitFamily, FitResult};
use crate::frame::{common_shape, Frame, FrameGroup, GroupKey};
use crate::series::MetricSeries;
use crate::stack::reduce::mean_std;
use crate::stack::{MasterFrame, MasterFrameBuilder, MasterFrameParams};

/// How the dark signal at each exposure time is measured.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum DarkMethod {
    /// Variance of summed pair differences; bias and fixed pattern cancel.
    /// `read_noise` (ADU) is removed in quadrature when given.
    FrameDifference {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        read_noise: Option<f64>,
    },
    /// Mean of the stacked darks minus a master bias.
    BiasSubtraction,
}

impl Default for DarkMethod {
    fn default() -> Self {
        Self::FrameDifference { read_noise: None }
    }
}

impl fmt::Display for DarkMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameDifference { read_noise: None } => write!(f, "Frame difference"),
            Self::FrameDifference {
                read_noise: Some(rn),
            } => write!(f, "Frame difference (RON {rn} ADU)"),
            Self::BiasSubtraction => write!(f, "Bias subtraction"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DarkConfig {
    pub method: DarkMethod,
    pub fit: FitFamily,
    /// Used to stack darks in the bias-subtraction method.
    pub stacking: MasterFrameParams,
}

#[derive(Clone, Debug, Serialize)]
pub struct DarkCurrentResult {
    /// Dark signal per exposure time.
    pub series: MetricSeries,
    pub fit: FitResult,
    /// Slope of the fit: dark signal per second.
    pub rate: f64,
    /// `signal / t` for every exposure time above zero.
    pub pointwise: MetricSeries,
}

/// Sum of capture-order pair differences `(f0 - f1) + (f2 - f3) + ...`.
///
/// Pairing is strict: frame 2n is always paired with frame 2n+1. A trailing
/// odd frame is left out. Returns the sum and the number of pairs.
pub fn paired_difference_sum(frames: &[Frame]) -> Result<(Array2<f64>, usize)> {
    if frames.len() < 2 {
        return Err(SensorError::insufficient("paired difference", 2, frames.len()));
    }
    let shape = common_shape(frames, "paired difference")?;
    if frames.len() % 2 == 1 {
        warn!(
            frames = frames.len(),
            ignored = %frames[frames.len() - 1].label(),
            "Odd frame count, trailing frame ignored"
        );
    }

    let mut sum = Array2::<f64>::zeros(shape);
    let mut pairs = 0;
    for pair in frames.chunks_exact(2) {
        sum += &pair[0].data;
        sum -= &pair[1].data;
        pairs += 1;
    }
    Ok((sum, pairs))
}

/// Dark current from darks grouped by exposure time.
#[derive(Clone, Debug, Default)]
pub struct DarkCurrentEstimator {
    config: DarkConfig,
}

impl DarkCurrentEstimator {
    pub fn new(config: DarkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DarkConfig {
        &self.config
    }

    /// Run the configured method. `master_bias` is required by
    /// [`DarkMethod::BiasSubtraction`] and ignored otherwise.
    pub fn estimate(
        &self,
        darks: &FrameGroup,
        master_bias: Option<&MasterFrame>,
    ) -> Result<DarkCurrentResult> {
        match self.config.method {
            DarkMethod::FrameDifference { read_noise } => {
                self.estimate_frame_difference(darks, read_noise)
            }
            DarkMethod::BiasSubtraction => {
                let bias = master_bias.ok_or_else(|| {
                    SensorError::InvalidParameter(
                        "bias-subtraction dark current needs a master bias".into(),
                    )
                })?;
                self.estimate_bias_subtracted(darks, bias)
            }
        }
    }

    /// Per exposure time t: `var(D) / 2m`, minus `read_noise²` when given,
    /// where D sums the m pair differences of that group.
    pub fn estimate_frame_difference(
        &self,
        darks: &FrameGroup,
        read_noise: Option<f64>,
    ) -> Result<DarkCurrentResult> {
        if let Some(rn) = read_noise {
            if !(rn >= 0.0) {
                return Err(SensorError::InvalidParameter(format!(
                    "read noise must be >= 0, got {rn}"
                )));
            }
        }
        let mut points = Vec::with_capacity(darks.len());
        for (key, frames) in darks.iter() {
            let t = exposure(darks, key)?;
            let (diff, pairs) = paired_difference_sum(frames)?;
            let flat: Vec<f64> = diff.iter().copied().collect();
            let (_, std) = mean_std(&flat);
            let mut y = std * std / (2 * pairs) as f64;
            if let Some(rn) = read_noise {
                y -= rn * rn;
            }
            debug!(t, pairs, signal = y, "Dark difference variance");
            points.push((t, y));
        }
        self.finish(points, "dark variance [ADU^2]")
    }

    /// Per exposure time t: mean of (stacked darks − master bias).
    ///
    /// A group holding a single frame is used as is; larger groups are
    /// combined with the configured stacking parameters.
    pub fn estimate_bias_subtracted(
        &self,
        darks: &FrameGroup,
        master_bias: &MasterFrame,
    ) -> Result<DarkCurrentResult> {
        if let Some(shape) = darks.shape() {
            if shape != master_bias.shape() {
                return Err(SensorError::shape("master bias", shape, master_bias.shape()));
            }
        }
        let builder = MasterFrameBuilder::new(self.config.stacking.clone());
        let mut points = Vec::with_capacity(darks.len());
        for (key, frames) in darks.iter() {
            let t = exposure(darks, key)?;
            let residual_mean = match frames {
                [single] => (&single.data - master_bias.data()).mean(),
                _ => {
                    let stacked = builder.build(frames)?;
                    (stacked.data() - master_bias.data()).mean()
                }
            }
            .unwrap_or(0.0);
            debug!(t, frames = frames.len(), signal = residual_mean, "Dark residual mean");
            points.push((t, residual_mean));
        }
        self.finish(points, "dark signal [ADU]")
    }

    fn finish(&self, points: Vec<(f64, f64)>, y_label: &str) -> Result<DarkCurrentResult> {
        let series = MetricSeries::from_points("exposure [s]", y_label, points)?;
        let fit = fit(&series, self.config.fit)?;
        let pointwise = MetricSeries::from_points(
            "exposure [s]",
            &format!("{y_label} per s"),
            series
                .points()
                .iter()
                .filter(|p| p.x > 0.0)
                .map(|p| (p.x, p.y / p.x)),
        )?;
        info!(
            method = %self.config.method,
            fit = %fit.family,
            exposures = series.len(),
            rate = fit.slope,
            r_squared = fit.r_squared,
            "Dark current estimated"
        );
        Ok(DarkCurrentResult {
            rate: fit.slope,
            series,
            fit,
            pointwise,
        })
    }
}

fn exposure(group: &FrameGroup, key: &GroupKey) -> Result<f64> {
    key.as_f64().ok_or_else(|| {
        SensorError::InvalidParameter(format!(
            "exposure {}='{}' is not numeric",
            group.key_name(),
            key
        ))
    })
}
