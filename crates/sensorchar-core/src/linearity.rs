use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::consts::{DEFAULT_SATURATION_ADU, EPSILON};
use crate::error::{Result, SensorError};
use crate::fit::{fit_excluding, FitFamily, FitResult};
use crate::frame::{FrameGroup, Roi};
use crate::series::{MetricSeries, SeriesPoint};
use crate::stack::reduce::view_mean_var;
use crate::stack::MasterFrame;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearityConfig {
    /// Region averaged per frame; the full frame when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<Roi>,
    pub saturation_adu: f64,
}

impl Default for LinearityConfig {
    fn default() -> Self {
        Self {
            roi: None,
            saturation_adu: DEFAULT_SATURATION_ADU,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LinearityResult {
    /// Mean signal per exposure time.
    pub series: MetricSeries,
    pub fit: FitResult,
    pub excluded: Vec<SeriesPoint>,
    /// Largest `|signal - fit| / fit` over the fitted points, in percent.
    pub max_nonlinearity_pct: f64,
}

/// Signal response against exposure time.
#[derive(Clone, Debug, Default)]
pub struct LinearityEstimator {
    config: LinearityConfig,
}

impl LinearityEstimator {
    pub fn new(config: LinearityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LinearityConfig {
        &self.config
    }

    /// Fit `signal = slope·t + intercept` over flats grouped by exposure time.
    pub fn estimate(
        &self,
        flats: &FrameGroup,
        master_dark: Option<&MasterFrame>,
    ) -> Result<LinearityResult> {
        let shape = flats
            .shape()
            .ok_or_else(|| SensorError::insufficient("linearity exposures", 2, 0))?;
        if let Some(dark) = master_dark {
            if dark.shape() != shape {
                return Err(SensorError::shape("master dark", shape, dark.shape()));
            }
        }
        let roi = self.config.roi.unwrap_or_else(|| Roi::full(shape));

        let mut points = Vec::with_capacity(flats.len());
        for (key, frames) in flats.iter() {
            let t = key.as_f64().ok_or_else(|| {
                SensorError::InvalidParameter(format!("exposure '{key}' is not numeric"))
            })?;
            let mut sum = 0.0;
            for frame in frames {
                let data = match master_dark {
                    Some(dark) => &frame.data - dark.data(),
                    None => frame.data.clone(),
                };
                sum += view_mean_var(&roi.view(&data)?).0;
            }
            points.push((t, sum / frames.len() as f64));
        }

        let series = MetricSeries::from_points("exposure [s]", "signal [ADU]", points)?;
        let limit = self.config.saturation_adu;
        let (fit, excluded) = fit_excluding(&series, FitFamily::Linear, |p| p.y > limit)?;
        for p in &excluded {
            warn!(
                t = p.x,
                signal = p.y,
                limit,
                "Saturated exposure excluded from linearity fit"
            );
        }

        let max_nonlinearity_pct = series
            .points()
            .iter()
            .filter(|p| p.y <= limit)
            .filter_map(|p| {
                let model = fit.predict(p.x);
                (model.abs() > EPSILON).then(|| ((p.y - model) / model).abs() * 100.0)
            })
            .fold(0.0, f64::max);

        info!(
            exposures = series.len(),
            excluded = excluded.len(),
            slope = fit.slope,
            max_nonlinearity_pct,
            "Linearity fitted"
        );
        Ok(LinearityResult {
            series,
            fit,
            excluded,
            max_nonlinearity_pct,
        })
    }
}
