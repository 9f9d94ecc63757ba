use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consts::DEFAULT_NOISE_CLIP_SIGMA;
use crate::error::{Result, SensorError};
use crate::frame::{common_shape, Frame};
use crate::stack::reduce::{mean_stack, mean_std, std_stack};
use crate::stack::sigma_clip::{clip_field, sigma_clip, ClipResult};
use crate::stack::MasterFrame;

/// How read-noise samples are drawn from a bias stack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseMode {
    /// Standard deviation across the stack at every pixel.
    #[default]
    PerPixel,
    /// Standard deviation of each capture-order pair difference `f[2n] - f[2n+1]`.
    PairDifference,
}

impl fmt::Display for NoiseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerPixel => write!(f, "Per-pixel"),
            Self::PairDifference => write!(f, "Pair difference"),
        }
    }
}

/// Divisor applied to the measured standard deviation.
///
/// The difference of two independent frames has √2 times the single-frame
/// noise, so `Sqrt2` is exact for [`NoiseMode::PairDifference`]. Per-pixel
/// deviations taken around a mean already measure single-frame noise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifferenceCorrection {
    #[default]
    Sqrt2,
    Uncorrected,
}

impl DifferenceCorrection {
    pub fn divisor(self) -> f64 {
        match self {
            Self::Sqrt2 => std::f64::consts::SQRT_2,
            Self::Uncorrected => 1.0,
        }
    }
}

impl fmt::Display for DifferenceCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqrt2 => write!(f, "1/sqrt(2)"),
            Self::Uncorrected => write!(f, "None"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub mode: NoiseMode,
    pub correction: DifferenceCorrection,
    /// Clip threshold applied to the samples before summarizing (default: 10.0).
    pub clip_sigma: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            mode: NoiseMode::PerPixel,
            correction: DifferenceCorrection::Sqrt2,
            clip_sigma: DEFAULT_NOISE_CLIP_SIGMA,
        }
    }
}

/// Statistics of the clipped read-noise samples, in ADU.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Samples that survived clipping.
    pub kept: usize,
    /// Samples before clipping.
    pub total: usize,
}

#[derive(Clone, Debug)]
pub struct NoiseEstimate {
    pub summary: NoiseSummary,
    /// Unclipped per-pixel noise (per-pixel mode only).
    pub field: Option<Array2<f64>>,
    pub clip: ClipResult,
}

/// Readout noise from a stack of bias frames.
#[derive(Clone, Debug, Default)]
pub struct NoiseEstimator {
    config: NoiseConfig,
}

impl NoiseEstimator {
    pub fn new(config: NoiseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NoiseConfig {
        &self.config
    }

    /// Estimate readout noise from `frames`.
    ///
    /// In per-pixel mode `master` replaces the stack's own mean as the
    /// reference. At least two frames are needed in either mode; a master
    /// is a reference only and never counts as a sample.
    pub fn estimate(&self, frames: &[Frame], master: Option<&MasterFrame>) -> Result<NoiseEstimate> {
        if frames.len() < 2 {
            return Err(SensorError::insufficient("readout noise", 2, frames.len()));
        }
        if !(self.config.clip_sigma > 0.0) {
            return Err(SensorError::InvalidParameter(format!(
                "noise clip sigma must be > 0, got {}",
                self.config.clip_sigma
            )));
        }
        let shape = common_shape(frames, "readout noise")?;
        if let Some(master) = master {
            if master.shape() != shape {
                return Err(SensorError::shape("readout noise master", shape, master.shape()));
            }
        }

        let divisor = self.config.correction.divisor();
        let (clip, field) = match self.config.mode {
            NoiseMode::PerPixel => {
                let reference = match master {
                    Some(m) => m.data().clone(),
                    None => mean_stack(frames)?,
                };
                let mut field = std_stack(frames, &reference)?;
                field.mapv_inplace(|v| v / divisor);
                let (clip, _) = clip_field(&field, self.config.clip_sigma);
                (clip, Some(field))
            }
            NoiseMode::PairDifference => {
                let samples = pair_noise(frames, divisor);
                let clip = sigma_clip(&samples, self.config.clip_sigma, self.config.clip_sigma);
                (clip, None)
            }
        };

        let summary = summarize(&clip)?;
        info!(
            frames = frames.len(),
            mode = %self.config.mode,
            correction = %self.config.correction,
            mean = summary.mean,
            median = summary.median,
            rejected = clip.rejected(),
            "Readout noise estimated"
        );
        Ok(NoiseEstimate {
            summary,
            field,
            clip,
        })
    }
}

fn pair_noise(frames: &[Frame], divisor: f64) -> Vec<f64> {
    if frames.len() % 2 == 1 {
        warn!(
            frames = frames.len(),
            "Odd frame count, last frame left out of the pair differences"
        );
    }
    frames
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let diff = &pair[0].data - &pair[1].data;
            let flat: Vec<f64> = diff.iter().copied().collect();
            let (_, std) = mean_std(&flat);
            debug!(pair = i, std, "Pair difference");
            std / divisor
        })
        .collect()
}

fn summarize(clip: &ClipResult) -> Result<NoiseSummary> {
    match (clip.min(), clip.max(), clip.mean(), clip.median()) {
        (Some(min), Some(max), Some(mean), Some(median)) => Ok(NoiseSummary {
            min,
            max,
            mean,
            median,
            kept: clip.values.len(),
            total: clip.total,
        }),
        _ => Err(SensorError::insufficient(
            "noise samples after clipping",
            1,
            0,
        )),
    }
}

fn check_sigma(sigma: f64) -> Result<()> {
    if !(sigma >= 0.0) || !sigma.is_finite() {
        return Err(SensorError::InvalidParameter(format!(
            "sigma must be finite and >= 0, got {sigma}"
        )));
    }
    Ok(())
}

fn check_z(z: f64) -> Result<()> {
    if !(z > 0.0) {
        return Err(SensorError::InvalidParameter(format!("z must be > 0, got {z}")));
    }
    Ok(())
}

/// Frames needed for a mean to lie within `moe` of the true value at
/// confidence `z`: `(z·σ/moe)²`.
pub fn required_sample_size(sigma: f64, z: f64, moe: f64) -> Result<f64> {
    check_sigma(sigma)?;
    check_z(z)?;
    if !(moe > 0.0) {
        return Err(SensorError::InvalidParameter(format!(
            "margin of error must be > 0, got {moe}"
        )));
    }
    let root = z * sigma / moe;
    Ok(root * root)
}

/// Margin of error of a mean over `n` samples: `z·σ/√n`.
pub fn margin_of_error(sigma: f64, z: f64, n: usize) -> Result<f64> {
    check_sigma(sigma)?;
    check_z(z)?;
    if n == 0 {
        return Err(SensorError::InvalidParameter("sample count must be > 0".into()));
    }
    Ok(z * sigma / (n as f64).sqrt())
}
