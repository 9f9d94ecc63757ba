#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Poisson};

use sensorchar_core::frame::{Frame, FrameGroup, GroupKey, HeaderValue};
use sensorchar_core::io::{write_fits, FitsBitpix};

/// Constant frame.
pub fn make_frame(h: usize, w: usize, fill: f64) -> Frame {
    Frame::new(Array2::from_elem((h, w), fill))
}

pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Bias-like frame: independent Gaussian samples around `level`.
pub fn gaussian_frame(rng: &mut StdRng, h: usize, w: usize, level: f64, sigma: f64) -> Frame {
    let normal = Normal::new(level, sigma).unwrap();
    Frame::new(Array2::from_shape_fn((h, w), |_| normal.sample(rng)))
}

/// Exposed frame: Poisson electrons converted at `gain` e⁻/ADU on top of
/// `offset` ADU, plus Gaussian read noise of `read_noise` ADU.
pub fn poisson_frame(
    rng: &mut StdRng,
    h: usize,
    w: usize,
    electrons: f64,
    gain: f64,
    offset: f64,
    read_noise: f64,
) -> Frame {
    let shot = (electrons > 0.0).then(|| Poisson::new(electrons).unwrap());
    let read = Normal::new(0.0, read_noise.max(1e-9)).unwrap();
    Frame::new(Array2::from_shape_fn((h, w), |_| {
        let e: f64 = match &shot {
            Some(dist) => dist.sample(rng),
            None => 0.0,
        };
        offset + e / gain + read.sample(rng)
    }))
}

pub fn tagged(mut frame: Frame, key: &str, value: f64) -> Frame {
    frame.header.set(key, HeaderValue::Float(value));
    frame
}

/// Group frames by numeric key, keeping the given order inside each key.
pub fn group(key: &str, entries: Vec<(f64, Vec<Frame>)>) -> FrameGroup {
    let mut group = FrameGroup::new(key);
    for (k, frames) in entries {
        for frame in frames {
            group.insert(GroupKey::number(k), frame).unwrap();
        }
    }
    group
}

/// Write frames as `{prefix}-{i}.fits` (i from 1) and return their paths.
pub fn write_frames(dir: &Path, prefix: &str, frames: &[Frame], bitpix: FitsBitpix) -> Vec<PathBuf> {
    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let path = dir.join(format!("{prefix}-{}.fits", i + 1));
            write_fits(&path, frame, bitpix).unwrap();
            path
        })
        .collect()
}
