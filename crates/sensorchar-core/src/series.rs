use serde::{Deserialize, Serialize};

use crate::error::{Result, SensorError};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub x: f64,
    pub y: f64,
}

/// Ordered (x, y) measurements produced by an estimator.
///
/// x values are strictly increasing: construction sorts the points and
/// averages the y values of duplicate x.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub x_label: String,
    pub y_label: String,
    points: Vec<SeriesPoint>,
}

impl MetricSeries {
    pub fn from_points(
        x_label: &str,
        y_label: &str,
        points: impl IntoIterator<Item = (f64, f64)>,
    ) -> Result<Self> {
        let mut raw: Vec<(f64, f64)> = points.into_iter().collect();
        if let Some(&(x, _)) = raw.iter().find(|(x, _)| !x.is_finite()) {
            return Err(SensorError::InvalidParameter(format!(
                "non-finite {x_label} value {x} in series"
            )));
        }
        raw.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<SeriesPoint> = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            let x = raw[i].0;
            let mut sum = 0.0;
            let mut n = 0usize;
            while i < raw.len() && raw[i].0 == x {
                sum += raw[i].1;
                n += 1;
                i += 1;
            }
            merged.push(SeriesPoint {
                x,
                y: sum / n as f64,
            });
        }

        Ok(Self {
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            points: merged,
        })
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Split into points for which `exclude` is false and those for which it is true.
    pub fn partition(
        &self,
        exclude: impl Fn(&SeriesPoint) -> bool,
    ) -> (Vec<SeriesPoint>, Vec<SeriesPoint>) {
        let (excluded, kept): (Vec<SeriesPoint>, Vec<SeriesPoint>) =
            self.points.iter().partition(|p| exclude(p));
        (kept, excluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_averaged_and_sorted() {
        let s = MetricSeries::from_points("t", "y", [(2.0, 4.0), (1.0, 1.0), (2.0, 6.0)]).unwrap();
        assert_eq!(s.xs(), vec![1.0, 2.0]);
        assert_eq!(s.ys(), vec![1.0, 5.0]);
    }

    #[test]
    fn non_finite_x_is_rejected() {
        assert!(MetricSeries::from_points("t", "y", [(f64::NAN, 1.0)]).is_err());
    }
}
