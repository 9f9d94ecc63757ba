use ndarray::{Array2, ArrayView2, Zip};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

use crate::error::{Result, SensorError};
use crate::frame::{common_shape, Frame};

/// Population mean and standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Population mean and variance of a 2D view.
pub fn view_mean_var(view: &ArrayView2<f64>) -> (f64, f64) {
    let n = view.len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = view.sum() / n;
    let var = view.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean)) / n;
    (mean, var)
}

/// Median via `select_nth_unstable`; reorders `values`.
pub fn median(values: &mut [f64]) -> f64 {
    let n = values.len();
    match n {
        0 => f64::NAN,
        1 => values[0],
        _ if n % 2 == 1 => *values.select_nth_unstable_by(n / 2, |a, b| a.total_cmp(b)).1,
        _ => {
            let mid = n / 2;
            values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            let upper = values[mid];
            values[..mid].select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b));
            (values[mid - 1] + upper) / 2.0
        }
    }
}

/// Per-pixel mean of a stack.
pub fn mean_stack(frames: &[Frame]) -> Result<Array2<f64>> {
    let shape = common_shape(frames, "mean stack")?;
    let mut sum = Array2::<f64>::zeros(shape);
    for frame in frames {
        sum += &frame.data;
    }
    sum /= frames.len() as f64;
    Ok(sum)
}

/// Per-pixel population standard deviation of `frame - reference` across a stack.
pub fn std_stack(frames: &[Frame], reference: &Array2<f64>) -> Result<Array2<f64>> {
    let shape = common_shape(frames, "std stack")?;
    if reference.dim() != shape {
        return Err(SensorError::shape("stack reference", shape, reference.dim()));
    }
    let n = frames.len() as f64;

    let mut sum = Array2::<f64>::zeros(shape);
    let mut sum_sq = Array2::<f64>::zeros(shape);
    for frame in frames {
        let residual = &frame.data - reference;
        sum_sq += &residual.mapv(|v| v * v);
        sum += &residual;
    }

    let pixel_std = |&s: &f64, &sq: &f64| {
        let mean = s / n;
        (sq / n - mean * mean).max(0.0).sqrt()
    };
    let zip = Zip::from(&sum).and(&sum_sq);
    if shape.0 * shape.1 >= PARALLEL_PIXEL_THRESHOLD {
        Ok(zip.par_map_collect(pixel_std))
    } else {
        Ok(zip.map_collect(pixel_std))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&mut [7.0]), 7.0);
    }

    #[test]
    fn mean_std_is_population() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(std, 2.0);
    }
}
