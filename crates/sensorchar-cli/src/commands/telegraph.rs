use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sensorchar_core::config::AnalysisConfig;
use sensorchar_core::frame::Frame;
use sensorchar_core::io::{write_fits, FitsBitpix};
use sensorchar_core::telegraph::find_telegraph_pixels;

use crate::summary::print_telegraph_summary;

#[derive(Args)]
pub struct TelegraphArgs {
    /// Directory of bias frames
    pub dir: PathBuf,

    /// Detection threshold in standard deviations above the mean
    #[arg(long)]
    pub sigma: Option<f64>,

    /// Edge of the traced window in pixels
    #[arg(long)]
    pub window: Option<usize>,

    /// Directory to write the traced window of every frame as FITS
    #[arg(long)]
    pub traces: Option<PathBuf>,
}

pub fn run(args: &TelegraphArgs, config: &AnalysisConfig) -> Result<()> {
    let mut telegraph = config.telegraph.clone();
    if let Some(sigma) = args.sigma {
        telegraph.sigma = sigma;
    }
    if let Some(window) = args.window {
        telegraph.window = window;
    }

    let frames = super::load_frames(&args.dir, config)?;
    let result = find_telegraph_pixels(&frames, &telegraph)?;
    print_telegraph_summary(&result);

    if let Some(ref dir) = args.traces {
        if result.traces.is_empty() {
            println!("No flagged pixels, nothing traced");
            return Ok(());
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for (i, trace) in result.traces.iter().enumerate() {
            let path = dir.join(format!("trace-{:04}.fits", i + 1));
            write_fits(&path, &Frame::new(trace.clone()), FitsBitpix::F64)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        println!("{} traces saved to {}", result.traces.len(), dir.display());
    }
    Ok(())
}
