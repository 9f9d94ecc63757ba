mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use tempfile::TempDir;

use sensorchar_core::error::SensorError;
use sensorchar_core::frame::Frame;
use sensorchar_core::io::{FitsBitpix, FrameStore};
use sensorchar_core::stack::{
    sigma_clip, FillPolicy, MasterFrame, MasterFrameBuilder, MasterFrameParams, StackReducer,
};

use common::{gaussian_frame, make_frame, seeded, write_frames};

fn with_hot_sample(frames: &mut [Frame], index: usize, row: usize, col: usize, value: f64) {
    frames[index].data[[row, col]] = value;
}

// ---------------------------------------------------------------------------
// MasterFrameBuilder::build
// ---------------------------------------------------------------------------

#[test]
fn test_constant_frames_give_constant_master() {
    let frames: Vec<Frame> = (0..5).map(|_| make_frame(16, 16, 123.25)).collect();
    for reducer in [StackReducer::Mean, StackReducer::Median] {
        let params = MasterFrameParams {
            reducer,
            ..Default::default()
        };
        let master = MasterFrameBuilder::new(params).build(&frames).unwrap();
        assert_eq!(master.shape(), (16, 16));
        assert_eq!(master.frame_count(), 5);
        for &v in master.data().iter() {
            assert_eq!(v, 123.25);
        }
    }
}

#[test]
fn test_constant_master_on_parallel_path() {
    // 300x300 is above the row-parallel threshold
    let frames: Vec<Frame> = (0..3).map(|_| make_frame(300, 300, 7.0)).collect();
    let master = MasterFrameBuilder::default().build(&frames).unwrap();
    assert!(master.data().iter().all(|&v| v == 7.0));
}

#[test]
fn test_hot_sample_is_rejected_and_filled() {
    let mut frames: Vec<Frame> = (0..20).map(|_| make_frame(6, 6, 100.0)).collect();
    with_hot_sample(&mut frames, 7, 2, 3, 10_000.0);
    let master = MasterFrameBuilder::default().build(&frames).unwrap();
    assert_abs_diff_eq!(master.data()[[2, 3]], 100.0, epsilon = 1e-9);
}

#[test]
fn test_unclipped_mean_differs_from_clipped() {
    let mut frames: Vec<Frame> = (0..20).map(|_| make_frame(4, 4, 100.0)).collect();
    with_hot_sample(&mut frames, 0, 0, 0, 2100.0);
    let params = MasterFrameParams {
        max_iters: Some(0),
        ..Default::default()
    };
    let master = MasterFrameBuilder::new(params).build(&frames).unwrap();
    // no clipping pass: plain mean
    assert_abs_diff_eq!(master.data()[[0, 0]], 200.0, epsilon = 1e-9);
}

#[test]
fn test_global_fill_uses_stack_mean() {
    // every pixel sits at 100 except pixel (0, 0) at 300, with one hot sample there
    let mut frames: Vec<Frame> = (0..20)
        .map(|_| {
            let mut f = make_frame(4, 4, 100.0);
            f.data[[0, 0]] = 300.0;
            f
        })
        .collect();
    with_hot_sample(&mut frames, 3, 0, 0, 50_000.0);

    let per_pixel = MasterFrameBuilder::default().build(&frames).unwrap();
    assert_abs_diff_eq!(per_pixel.data()[[0, 0]], 300.0, epsilon = 1e-9);

    let global = MasterFrameBuilder::new(MasterFrameParams {
        fill: FillPolicy::Global,
        ..Default::default()
    })
    .build(&frames)
    .unwrap();
    // survivors: 15 pixels x 20 frames at 100, 19 samples at 300
    let fill = (15.0 * 20.0 * 100.0 + 19.0 * 300.0) / (15.0 * 20.0 + 19.0);
    assert_abs_diff_eq!(global.data()[[0, 0]], (19.0 * 300.0 + fill) / 20.0, epsilon = 1e-9);
    assert_abs_diff_eq!(global.data()[[1, 1]], 100.0, epsilon = 1e-9);
}

#[test]
fn test_median_reducer() {
    let frames: Vec<Frame> = [1.0, 2.0, 4.0, 8.0]
        .iter()
        .map(|&v| make_frame(3, 3, v))
        .collect();
    let master = MasterFrameBuilder::new(MasterFrameParams {
        reducer: StackReducer::Median,
        ..Default::default()
    })
    .build(&frames)
    .unwrap();
    assert_abs_diff_eq!(master.data()[[1, 1]], 3.0, epsilon = 1e-12);
}

#[test]
fn test_single_frame_is_insufficient() {
    let err = MasterFrameBuilder::default()
        .build(&[make_frame(4, 4, 1.0)])
        .unwrap_err();
    assert!(matches!(
        err,
        SensorError::InsufficientData {
            needed: 2,
            found: 1,
            ..
        }
    ));
}

#[test]
fn test_mixed_shapes_rejected() {
    let frames = vec![make_frame(4, 4, 1.0), make_frame(4, 5, 1.0)];
    let err = MasterFrameBuilder::default().build(&frames).unwrap_err();
    assert!(matches!(err, SensorError::ShapeMismatch { .. }));
}

#[test]
fn test_non_positive_sigma_rejected() {
    let frames = vec![make_frame(2, 2, 1.0), make_frame(2, 2, 1.0)];
    let params = MasterFrameParams {
        sigma: 0.0,
        ..Default::default()
    };
    let err = MasterFrameBuilder::new(params).build(&frames).unwrap_err();
    assert!(matches!(err, SensorError::InvalidParameter(_)));
}

// ---------------------------------------------------------------------------
// Streaming build
// ---------------------------------------------------------------------------

fn noisy_stack() -> Vec<Frame> {
    let mut rng = seeded(11);
    let mut frames: Vec<Frame> = (0..9)
        .map(|_| gaussian_frame(&mut rng, 37, 23, 500.0, 8.0))
        .collect();
    with_hot_sample(&mut frames, 4, 10, 10, 9_000.0);
    with_hot_sample(&mut frames, 2, 36, 0, -3_000.0);
    frames
}

fn assert_same(a: &Array2<f64>, b: &Array2<f64>) {
    assert_eq!(a.dim(), b.dim());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
    }
}

#[test]
fn test_streaming_matches_in_memory() {
    let dir = TempDir::new().unwrap();
    let paths = write_frames(dir.path(), "bias", &noisy_stack(), FitsBitpix::F64);
    let frames = FrameStore::new(dir.path()).load().unwrap();

    for fill in [FillPolicy::PerPixel, FillPolicy::Global] {
        for reducer in [StackReducer::Mean, StackReducer::Median] {
            let builder = MasterFrameBuilder::new(MasterFrameParams {
                fill,
                reducer,
                ..Default::default()
            });
            let whole = builder.build(&frames).unwrap();
            let banded = builder.build_streaming(&paths, 5).unwrap();
            assert_same(whole.data(), banded.data());
            assert_eq!(banded.frame_count(), 9);
        }
    }
}

#[test]
fn test_streaming_rejects_zero_band() {
    let dir = TempDir::new().unwrap();
    let paths = write_frames(dir.path(), "bias", &noisy_stack(), FitsBitpix::F64);
    let err = MasterFrameBuilder::default()
        .build_streaming(&paths, 0)
        .unwrap_err();
    assert!(matches!(err, SensorError::InvalidParameter(_)));
}

#[test]
fn test_streaming_shape_mismatch() {
    let dir = TempDir::new().unwrap();
    let mut paths = write_frames(dir.path(), "a", &[make_frame(4, 4, 1.0)], FitsBitpix::F32);
    paths.extend(write_frames(dir.path(), "b", &[make_frame(5, 4, 1.0)], FitsBitpix::F32));
    let err = MasterFrameBuilder::default()
        .build_streaming(&paths, 2)
        .unwrap_err();
    assert!(matches!(err, SensorError::ShapeMismatch { .. }));
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn test_master_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("master_bias.fits");
    let params = MasterFrameParams {
        sigma: 2.5,
        max_iters: Some(4),
        reducer: StackReducer::Median,
        fill: FillPolicy::Global,
    };
    let master = MasterFrameBuilder::new(params.clone())
        .build(&noisy_stack())
        .unwrap();
    master.save(&path).unwrap();

    let loaded = MasterFrame::load(&path).unwrap();
    assert_eq!(loaded.params(), &params);
    assert_eq!(loaded.frame_count(), 9);
    assert_eq!(loaded.data(), master.data());
}

#[test]
fn test_master_load_keeps_iteration_limit() {
    let dir = TempDir::new().unwrap();
    for (name, max_iters) in [("unclipped.fits", Some(0)), ("converged.fits", None)] {
        let path = dir.path().join(name);
        let params = MasterFrameParams {
            max_iters,
            ..MasterFrameParams::default()
        };
        let master = MasterFrameBuilder::new(params).build(&noisy_stack()).unwrap();
        master.save(&path).unwrap();

        let loaded = MasterFrame::load(&path).unwrap();
        assert_eq!(loaded.params().max_iters, max_iters, "{name}");
        assert_eq!(loaded.frame().header.contains("CLIPITER"), max_iters.is_some());
    }
}

// ---------------------------------------------------------------------------
// 1D sigma clip
// ---------------------------------------------------------------------------

#[test]
fn test_sigma_clip_removes_outliers() {
    let mut values: Vec<f64> = (0..100).map(|i| 10.0 + (i % 5) as f64 * 0.1).collect();
    values.push(1e6);
    values.push(-1e6);
    let clip = sigma_clip(&values, 3.0, 3.0);
    assert_eq!(clip.total, 102);
    assert_eq!(clip.rejected(), 2);
    assert!(clip.keeps(10.2));
    assert!(!clip.keeps(1e6));
}

#[test]
fn test_sigma_clip_is_idempotent() {
    let mut rng = seeded(3);
    let frame = gaussian_frame(&mut rng, 40, 40, 0.0, 1.0);
    let mut values: Vec<f64> = frame.data.iter().copied().collect();
    values.extend([9.0, 12.0, -15.0]);

    let once = sigma_clip(&values, 2.5, 2.5);
    let twice = sigma_clip(&once.values, 2.5, 2.5);
    assert_eq!(once.values, twice.values);
    assert_eq!(twice.rejected(), 0);
}

#[test]
fn test_sigma_clip_ignores_non_finite() {
    let clip = sigma_clip(&[1.0, f64::NAN, 1.0, f64::INFINITY], 3.0, 3.0);
    assert_eq!(clip.total, 2);
    assert_eq!(clip.values, vec![1.0, 1.0]);
}
