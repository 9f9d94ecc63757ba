use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_GAIN_MAP_BLOCK, DEFAULT_PTC_ROI_SIZE, DEFAULT_SATURATION_ADU, EPSILON};
use crate::error::{Result, SensorError};
use crate::fit::{fit_excluding, FitFamily, FitResult};
use crate::frame::{FrameGroup, Roi};
use crate::series::{MetricSeries, SeriesPoint};
use crate::stack::reduce::view_mean_var;
use crate::stack::MasterFrame;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtcConfig {
    /// Height and width of the centered region used when no ROI is given.
    pub roi_size: (usize, usize),
    /// Levels with a mean above this are kept in the curve but not fitted.
    pub saturation_adu: f64,
    /// Tile edge for [`GainEstimator::gain_map`].
    pub gain_map_block: usize,
}

impl Default for PtcConfig {
    fn default() -> Self {
        Self {
            roi_size: (DEFAULT_PTC_ROI_SIZE, DEFAULT_PTC_ROI_SIZE),
            saturation_adu: DEFAULT_SATURATION_ADU,
            gain_map_block: DEFAULT_GAIN_MAP_BLOCK,
        }
    }
}

/// Photon transfer curve and the quantities derived from its slope.
#[derive(Clone, Debug, Serialize)]
pub struct PtcResult {
    /// (mean, variance) per illumination level, saturated levels included.
    pub series: MetricSeries,
    pub fit: FitResult,
    /// Levels left out of the fit for exceeding the saturation limit.
    pub excluded: Vec<SeriesPoint>,
    /// Conversion gain in e⁻/ADU (`1 / slope`).
    pub gain: f64,
    pub read_noise_adu: f64,
    pub read_noise_electrons: f64,
    pub roi: Roi,
}

/// Conversion gain from flats grouped by illumination level.
#[derive(Clone, Debug, Default)]
pub struct GainEstimator {
    config: PtcConfig,
}

impl GainEstimator {
    pub fn new(config: PtcConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PtcConfig {
        &self.config
    }

    /// Fit `variance = slope·mean + intercept` over the levels of `flats`.
    ///
    /// Each frame is dark-subtracted and cropped to `roi` (default: the
    /// configured centered region); the per-frame ROI mean and variance are
    /// averaged over the frames of a level.
    pub fn estimate(
        &self,
        flats: &FrameGroup,
        master_dark: Option<&MasterFrame>,
        roi: Option<Roi>,
    ) -> Result<PtcResult> {
        let shape = flats
            .shape()
            .ok_or_else(|| SensorError::insufficient("photon transfer curve", 2, 0))?;
        let roi = roi.unwrap_or_else(|| {
            Roi::centered(shape, self.config.roi_size.0, self.config.roi_size.1)
        });
        let levels = dark_subtracted_levels(flats, master_dark)?;
        let points = level_points(&levels, roi)?;
        for &(mean, var) in &points {
            debug!(mean, var, "PTC level");
        }

        let (fit, excluded, gain) = self.fit_curve(&points)?;
        let series = MetricSeries::from_points("mean [ADU]", "variance [ADU^2]", points)?;
        for p in &excluded {
            warn!(
                mean = p.x,
                limit = self.config.saturation_adu,
                "Saturated level excluded from PTC fit"
            );
        }

        let read_noise_adu = fit.intercept.abs().sqrt();
        info!(
            levels = series.len(),
            excluded = excluded.len(),
            gain,
            read_noise_adu,
            r_squared = fit.r_squared,
            "Photon transfer curve fitted"
        );
        Ok(PtcResult {
            series,
            excluded,
            gain,
            read_noise_adu,
            read_noise_electrons: gain * read_noise_adu,
            fit,
            roi,
        })
    }

    /// Gain of every `block`×`block` tile, fitted independently.
    ///
    /// Partial tiles at the right and bottom edges are skipped.
    pub fn gain_map(
        &self,
        flats: &FrameGroup,
        master_dark: Option<&MasterFrame>,
        block: usize,
    ) -> Result<Array2<f64>> {
        let (rows, cols) = flats
            .shape()
            .ok_or_else(|| SensorError::insufficient("gain map", 2, 0))?;
        if block == 0 || block > rows || block > cols {
            return Err(SensorError::InvalidParameter(format!(
                "gain map block {block} does not fit a {rows}x{cols} frame"
            )));
        }
        let levels = dark_subtracted_levels(flats, master_dark)?;
        let (tiles_y, tiles_x) = (rows / block, cols / block);

        let gains = (0..tiles_y * tiles_x)
            .into_par_iter()
            .map(|i| -> Result<f64> {
                let roi = Roi::new((i / tiles_x) * block, (i % tiles_x) * block, block, block);
                let points = level_points(&levels, roi)?;
                let (_, _, gain) = self.fit_curve(&points)?;
                Ok(gain)
            })
            .collect::<Result<Vec<f64>>>()?;

        info!(tiles_y, tiles_x, block, "Gain map computed");
        Array2::from_shape_vec((tiles_y, tiles_x), gains)
            .map_err(|e| SensorError::InvalidParameter(e.to_string()))
    }

    fn fit_curve(&self, points: &[(f64, f64)]) -> Result<(FitResult, Vec<SeriesPoint>, f64)> {
        if points.iter().all(|&(_, var)| var.abs() < EPSILON) {
            return Err(SensorError::FitDegenerate(
                "variance is zero at every level".into(),
            ));
        }
        let series =
            MetricSeries::from_points("mean [ADU]", "variance [ADU^2]", points.iter().copied())?;
        let limit = self.config.saturation_adu;
        let (fit, excluded) = fit_excluding(&series, FitFamily::Linear, |p| p.x > limit)?;
        if !(fit.slope > 0.0) {
            return Err(SensorError::FitDegenerate(format!(
                "PTC slope {} is not positive",
                fit.slope
            )));
        }
        let gain = 1.0 / fit.slope;
        Ok((fit, excluded, gain))
    }
}

/// Frames of every level with the master dark removed, in ascending key order.
fn dark_subtracted_levels(
    flats: &FrameGroup,
    master_dark: Option<&MasterFrame>,
) -> Result<Vec<Vec<Array2<f64>>>> {
    if flats.len() < 2 {
        return Err(SensorError::insufficient(
            "photon transfer levels",
            2,
            flats.len(),
        ));
    }
    if let (Some(shape), Some(dark)) = (flats.shape(), master_dark) {
        if shape != dark.shape() {
            return Err(SensorError::shape("master dark", shape, dark.shape()));
        }
    }
    Ok(flats
        .iter()
        .map(|(_, frames)| {
            frames
                .iter()
                .map(|f| match master_dark {
                    Some(dark) => &f.data - dark.data(),
                    None => f.data.clone(),
                })
                .collect()
        })
        .collect())
}

/// (mean, variance) of `roi` per level, averaged over the level's frames.
fn level_points(levels: &[Vec<Array2<f64>>], roi: Roi) -> Result<Vec<(f64, f64)>> {
    levels
        .iter()
        .map(|frames| -> Result<(f64, f64)> {
            let mut mean_sum = 0.0;
            let mut var_sum = 0.0;
            for data in frames {
                let (mean, var) = view_mean_var(&roi.view(data)?);
                mean_sum += mean;
                var_sum += var;
            }
            let n = frames.len() as f64;
            Ok((mean_sum / n, var_sum / n))
        })
        .collect()
}
