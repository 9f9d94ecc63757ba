use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SensorError};
use crate::series::{MetricSeries, SeriesPoint};

/// Model family for a least-squares curve fit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitFamily {
    /// `y = slope·x + intercept`
    #[default]
    Linear,
    /// `y = slope·ln(x) + intercept`, for sub-linear responses. Requires x > 0.
    Logarithmic,
}

impl fmt::Display for FitFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "Linear"),
            Self::Logarithmic => write!(f, "Logarithmic"),
        }
    }
}

/// Least-squares fit of a series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub family: FitFamily,
    pub slope: f64,
    pub intercept: f64,
    /// x range covered by the fitted points.
    pub domain: (f64, f64),
    pub r_squared: f64,
    /// `y - model(x)` for each fitted point, in x order.
    pub residuals: Vec<f64>,
    pub points_used: usize,
}

impl FitResult {
    pub fn predict(&self, x: f64) -> f64 {
        match self.family {
            FitFamily::Linear => self.slope * x + self.intercept,
            FitFamily::Logarithmic => self.slope * x.ln() + self.intercept,
        }
    }
}

/// Fit every point of the series.
pub fn fit(series: &MetricSeries, family: FitFamily) -> Result<FitResult> {
    fit_points(series.points(), family)
}

/// Fit the points for which `exclude` is false; also returns the excluded points.
pub fn fit_excluding(
    series: &MetricSeries,
    family: FitFamily,
    exclude: impl Fn(&SeriesPoint) -> bool,
) -> Result<(FitResult, Vec<SeriesPoint>)> {
    let (kept, excluded) = series.partition(exclude);
    let result = fit_points(&kept, family)?;
    Ok((result, excluded))
}

/// Ordinary least squares over `points`.
///
/// Fewer than two points is `InsufficientData`; two or more points without
/// two distinct x values, or any non-finite y, is `FitDegenerate`.
pub fn fit_points(points: &[SeriesPoint], family: FitFamily) -> Result<FitResult> {
    if points.len() < 2 {
        return Err(SensorError::insufficient(
            format!("{family} fit"),
            2,
            points.len(),
        ));
    }
    if let Some(p) = points.iter().find(|p| !p.y.is_finite()) {
        return Err(SensorError::FitDegenerate(format!(
            "non-finite value {} at x = {}",
            p.y, p.x
        )));
    }

    let xs: Vec<f64> = match family {
        FitFamily::Linear => points.iter().map(|p| p.x).collect(),
        FitFamily::Logarithmic => {
            if let Some(p) = points.iter().find(|p| p.x <= 0.0) {
                return Err(SensorError::InvalidParameter(format!(
                    "logarithmic fit needs x > 0, got {}",
                    p.x
                )));
            }
            points.iter().map(|p| p.x.ln()).collect()
        }
    };
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let sxx: f64 = xs.iter().map(|x| (x - mean_x) * (x - mean_x)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    if xs.iter().all(|&x| x == xs[0]) || !(sxx > 0.0) {
        return Err(SensorError::FitDegenerate(
            "fewer than 2 distinct x values".into(),
        ));
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let residuals: Vec<f64> = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| y - (slope * x + intercept))
        .collect();
    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    let ss_tot: f64 = ys.iter().map(|y| (y - mean_y) * (y - mean_y)).sum();
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        1.0
    };

    let domain = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.x), hi.max(p.x))
        });

    Ok(FitResult {
        family,
        slope,
        intercept,
        domain,
        r_squared,
        residuals,
        points_used: points.len(),
    })
}
