use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{Result, SensorError};
use crate::frame::{common_shape, Frame, FrameHeader, HeaderValue};
use crate::io::fits::{load_fits, FitsReader};
use crate::io::fits_writer::{write_fits, FitsBitpix};
use crate::stack::reduce::median;
use crate::stack::sigma_clip::clip_samples;
use crate::stack::{FillPolicy, MasterFrameParams, StackReducer};

/// A combined calibration frame.
///
/// Built once from a stack and then only read: there is no mutable access
/// to the pixels.
#[derive(Clone, Debug)]
pub struct MasterFrame {
    frame: Frame,
    params: MasterFrameParams,
    frame_count: usize,
}

impl MasterFrame {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.frame.data
    }

    pub fn shape(&self) -> (usize, usize) {
        self.frame.shape()
    }

    pub fn params(&self) -> &MasterFrameParams {
        &self.params
    }

    /// Number of frames combined into this master.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Persist as a 64-bit float FITS file with the build parameters in the header.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_fits(path, &self.frame, FitsBitpix::F64)?;
        info!(path = %path.display(), frames = self.frame_count, "Master frame saved");
        Ok(())
    }

    /// Reload a master written by [`MasterFrame::save`].
    ///
    /// Build parameters missing from the header fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let frame = load_fits(path)?;
        let header = &frame.header;
        let defaults = MasterFrameParams::default();
        let params = MasterFrameParams {
            sigma: header.get_f64("CLIPSIG").unwrap_or(defaults.sigma),
            max_iters: header
                .get("CLIPITER")
                .and_then(HeaderValue::as_i64)
                .filter(|&i| i >= 0)
                .map(|i| i as usize),
            reducer: match header.get("REDUCER").and_then(HeaderValue::as_str) {
                Some("MEDIAN") => StackReducer::Median,
                _ => StackReducer::Mean,
            },
            fill: match header.get("FILLPOL").and_then(HeaderValue::as_str) {
                Some("GLOBAL") => FillPolicy::Global,
                _ => FillPolicy::PerPixel,
            },
        };
        let frame_count = header
            .get("NCOMBINE")
            .and_then(HeaderValue::as_i64)
            .unwrap_or(0)
            .max(0) as usize;
        Ok(Self {
            frame,
            params,
            frame_count,
        })
    }

    fn assemble(data: Array2<f64>, base: FrameHeader, params: &MasterFrameParams, n: usize) -> Self {
        let mut header = base;
        header.set("NCOMBINE", HeaderValue::Int(n as i64));
        header.set("CLIPSIG", HeaderValue::Float(params.sigma));
        // no CLIPITER card means clipping ran to convergence
        match params.max_iters {
            Some(i) => header.set("CLIPITER", HeaderValue::Int(i as i64)),
            None => {
                header.remove("CLIPITER");
            }
        }
        header.set(
            "REDUCER",
            HeaderValue::Text(params.reducer.to_string().to_ascii_uppercase()),
        );
        header.set(
            "FILLPOL",
            HeaderValue::Text(
                match params.fill {
                    FillPolicy::PerPixel => "PERPIXEL",
                    FillPolicy::Global => "GLOBAL",
                }
                .to_string(),
            ),
        );
        Self {
            frame: Frame::new(data).with_header(header),
            params: params.clone(),
            frame_count: n,
        }
    }
}

/// Combines a stack of frames into a [`MasterFrame`].
///
/// Per pixel: reject samples more than `sigma` standard deviations from the
/// mean (repeating on the survivors), replace rejected samples with the fill
/// value, then reduce the filled stack with the configured reducer.
#[derive(Clone, Debug, Default)]
pub struct MasterFrameBuilder {
    params: MasterFrameParams,
}

impl MasterFrameBuilder {
    pub fn new(params: MasterFrameParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MasterFrameParams {
        &self.params
    }

    /// Build from frames held in memory.
    pub fn build(&self, frames: &[Frame]) -> Result<MasterFrame> {
        if frames.len() < 2 {
            return Err(SensorError::insufficient("master frame", 2, frames.len()));
        }
        self.validate()?;
        common_shape(frames, "master frame")?;

        let stack: Vec<ArrayView2<f64>> = frames.iter().map(|f| f.data.view()).collect();
        let fill = match self.params.fill {
            FillPolicy::Global => Some(global_fill(&[row_fill_stats(&stack, &self.params)])),
            FillPolicy::PerPixel => None,
        };
        let data = reduce_band(&stack, &self.params, fill);

        info!(
            frames = frames.len(),
            reducer = %self.params.reducer,
            fill = %self.params.fill,
            "Master frame built"
        );
        Ok(MasterFrame::assemble(
            data,
            frames[0].header.clone(),
            &self.params,
            frames.len(),
        ))
    }

    /// Build from FITS files, decoding `block_rows` rows of every frame at a time.
    ///
    /// Resident memory is bounded by `frames × block_rows × cols` samples plus
    /// the output. The result equals [`MasterFrameBuilder::build`] on the
    /// same files.
    pub fn build_streaming(&self, paths: &[PathBuf], block_rows: usize) -> Result<MasterFrame> {
        if paths.len() < 2 {
            return Err(SensorError::insufficient("master frame", 2, paths.len()));
        }
        if block_rows == 0 {
            return Err(SensorError::InvalidParameter("block_rows must be > 0".into()));
        }
        self.validate()?;

        let readers = paths
            .iter()
            .map(|p| FitsReader::open(p))
            .collect::<Result<Vec<_>>>()?;
        let shape = readers[0].shape();
        for (reader, path) in readers.iter().zip(paths).skip(1) {
            if reader.shape() != shape {
                return Err(SensorError::shape(
                    format!("master frame ({})", path.display()),
                    shape,
                    reader.shape(),
                ));
            }
        }
        let (rows, cols) = shape;
        let bands: Vec<(usize, usize)> = (0..rows)
            .step_by(block_rows)
            .map(|start| (start, block_rows.min(rows - start)))
            .collect();

        let read_band = |start: usize, count: usize| -> Result<Vec<Array2<f64>>> {
            readers.iter().map(|r| r.read_rows(start, count)).collect()
        };

        let fill = match self.params.fill {
            FillPolicy::Global => {
                let mut per_band = Vec::with_capacity(bands.len());
                for &(start, count) in &bands {
                    let band = read_band(start, count)?;
                    let views: Vec<_> = band.iter().map(|b| b.view()).collect();
                    per_band.push(row_fill_stats(&views, &self.params));
                }
                Some(global_fill(&per_band))
            }
            FillPolicy::PerPixel => None,
        };

        let mut data = Array2::<f64>::zeros((rows, cols));
        for &(start, count) in &bands {
            let band = read_band(start, count)?;
            let views: Vec<_> = band.iter().map(|b| b.view()).collect();
            let reduced = reduce_band(&views, &self.params, fill);
            data.slice_mut(ndarray::s![start..start + count, ..])
                .assign(&reduced);
            debug!(start, count, "Reduced row band");
        }

        info!(
            frames = paths.len(),
            block_rows,
            bands = bands.len(),
            "Master frame built (streaming)"
        );
        Ok(MasterFrame::assemble(
            data,
            readers[0].tags(),
            &self.params,
            paths.len(),
        ))
    }

    fn validate(&self) -> Result<()> {
        if !(self.params.sigma > 0.0) {
            return Err(SensorError::InvalidParameter(format!(
                "clip sigma must be > 0, got {}",
                self.params.sigma
            )));
        }
        Ok(())
    }
}

/// Survivor sum and count of every row, in row order.
fn row_fill_stats(stack: &[ArrayView2<f64>], params: &MasterFrameParams) -> Vec<(f64, usize)> {
    let (h, w) = stack[0].dim();
    let n = stack.len();
    let process_row = |row: usize| -> (f64, usize) {
        let mut values = vec![0.0f64; n];
        let mut mask = vec![true; n];
        let mut sum = 0.0;
        let mut count = 0;
        for col in 0..w {
            for (i, frame) in stack.iter().enumerate() {
                values[i] = frame[[row, col]];
            }
            let (s, c) = clip_samples(&values, &mut mask, params.sigma, params.max_iters);
            sum += s;
            count += c;
        }
        (sum, count)
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(&process_row).collect()
    } else {
        (0..h).map(&process_row).collect()
    }
}

/// Mean of all survivors, summed in row order so banded and whole-frame
/// builds agree exactly.
fn global_fill(per_band: &[Vec<(f64, usize)>]) -> f64 {
    let (sum, count) = per_band
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(s, c), &(rs, rc)| (s + rs, c + rc));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn reduce_band(
    stack: &[ArrayView2<f64>],
    params: &MasterFrameParams,
    global_fill: Option<f64>,
) -> Array2<f64> {
    let (h, w) = stack[0].dim();
    let n = stack.len();

    let process_row = |row: usize| -> Vec<f64> {
        let mut values = vec![0.0f64; n];
        let mut mask = vec![true; n];
        let mut row_result = vec![0.0f64; w];
        for (col, result) in row_result.iter_mut().enumerate() {
            for (i, frame) in stack.iter().enumerate() {
                values[i] = frame[[row, col]];
            }
            let (sum, count) = clip_samples(&values, &mut mask, params.sigma, params.max_iters);
            let fill = global_fill.unwrap_or(sum / count as f64);
            *result = reduce_filled(&mut values, &mask, fill, params.reducer);
        }
        row_result
    };

    let rows: Vec<Vec<f64>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(&process_row).collect()
    } else {
        (0..h).map(&process_row).collect()
    };

    let mut result = Array2::<f64>::zeros((h, w));
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, val) in row_data.into_iter().enumerate() {
            result[[row, col]] = val;
        }
    }
    result
}

fn reduce_filled(values: &mut [f64], mask: &[bool], fill: f64, reducer: StackReducer) -> f64 {
    for (v, &keep) in values.iter_mut().zip(mask) {
        if !keep {
            *v = fill;
        }
    }
    match reducer {
        StackReducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
        StackReducer::Median => median(values),
    }
}
