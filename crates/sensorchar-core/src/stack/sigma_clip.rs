use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::{EPSILON, MAX_CLIP_ITERATIONS};
use crate::stack::reduce::{mean_std, median};

/// Outcome of clipping a set of values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipResult {
    /// Surviving values, in input order.
    pub values: Vec<f64>,
    /// Lower acceptance bound of the final iteration.
    pub lower: f64,
    /// Upper acceptance bound of the final iteration.
    pub upper: f64,
    /// Number of finite values before clipping.
    pub total: usize,
}

impl ClipResult {
    /// Whether `v` lies inside the final bounds.
    pub fn keeps(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }

    pub fn rejected(&self) -> usize {
        self.total - self.values.len()
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }

    pub fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            let mut scratch = self.values.clone();
            Some(median(&mut scratch))
        }
    }
}

/// Iterative sigma clip to convergence.
///
/// Each pass keeps values within `[mean - low*std, mean + high*std]` of the
/// current survivors and stops once a pass rejects nothing. Non-finite
/// values are dropped up front. Clipping an already clipped set with the same
/// thresholds returns it unchanged.
pub fn sigma_clip(values: &[f64], low: f64, high: f64) -> ClipResult {
    let mut kept: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let total = kept.len();
    let mut lower = f64::NEG_INFINITY;
    let mut upper = f64::INFINITY;

    for _ in 0..MAX_CLIP_ITERATIONS {
        if kept.is_empty() {
            break;
        }
        let (mean, std) = mean_std(&kept);
        lower = mean - low * std;
        upper = mean + high * std;
        let before = kept.len();
        kept.retain(|&v| v >= lower && v <= upper);
        if kept.len() == before {
            break;
        }
    }

    ClipResult {
        values: kept,
        lower,
        upper,
        total,
    }
}

/// Clip every value of a 2D field, returning the result and the keep mask.
pub fn clip_field(field: &Array2<f64>, sigma: f64) -> (ClipResult, Array2<bool>) {
    let flat: Vec<f64> = field.iter().copied().collect();
    let clip = sigma_clip(&flat, sigma, sigma);
    let mask = field.mapv(|v| v.is_finite() && clip.keeps(v));
    (clip, mask)
}

/// Per-pixel stack rejection.
///
/// `mask[i]` ends `true` for samples that survive. Returns the sum and count
/// of survivors; if every sample would be rejected the full set is kept.
pub(crate) fn clip_samples(
    values: &[f64],
    mask: &mut [bool],
    sigma: f64,
    max_iters: Option<usize>,
) -> (f64, usize) {
    mask.iter_mut().for_each(|m| *m = true);
    let iterations = max_iters.unwrap_or(MAX_CLIP_ITERATIONS);

    for _ in 0..iterations {
        let (mean, std) = masked_mean_std(values, mask);
        if std < EPSILON {
            break;
        }
        let lo = mean - sigma * std;
        let hi = mean + sigma * std;
        let mut rejected = 0;
        for (m, &v) in mask.iter_mut().zip(values) {
            if *m && (v < lo || v > hi) {
                *m = false;
                rejected += 1;
            }
        }
        if rejected == 0 {
            break;
        }
    }

    let (sum, count) = values
        .iter()
        .zip(mask.iter())
        .filter(|&(_, &m)| m)
        .fold((0.0, 0usize), |(s, c), (&v, _)| (s + v, c + 1));

    if count == 0 {
        mask.iter_mut().for_each(|m| *m = true);
        return (values.iter().sum(), values.len());
    }
    (sum, count)
}

fn masked_mean_std(values: &[f64], mask: &[bool]) -> (f64, f64) {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (&v, &m) in values.iter().zip(mask) {
        if m {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;

    let mut var_sum = 0.0;
    for (&v, &m) in values.iter().zip(mask) {
        if m {
            let d = v - mean;
            var_sum += d * d;
        }
    }
    (mean, (var_sum / count as f64).sqrt())
}
