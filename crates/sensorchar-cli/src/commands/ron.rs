use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use sensorchar_core::config::AnalysisConfig;
use sensorchar_core::frame::Frame;
use sensorchar_core::io::{write_fits, FitsBitpix};
use sensorchar_core::noise::{DifferenceCorrection, NoiseEstimator, NoiseMode};

use crate::summary::print_noise_summary;

#[derive(Clone, ValueEnum)]
pub enum ModeArg {
    PerPixel,
    PairDifference,
}

#[derive(Args)]
pub struct RonArgs {
    /// Directory of bias frames
    pub dir: PathBuf,

    /// Master bias used as the per-pixel reference
    #[arg(long)]
    pub master: Option<PathBuf>,

    /// Estimation mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Skip the 1/sqrt(2) correction of pair differences
    #[arg(long)]
    pub uncorrected: bool,

    /// Outlier threshold for the noise samples
    #[arg(long)]
    pub clip_sigma: Option<f64>,

    /// Write the per-pixel noise field to a FITS file
    #[arg(long)]
    pub field: Option<PathBuf>,

    /// Save the summary as TOML
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &RonArgs, config: &AnalysisConfig) -> Result<()> {
    let mut noise = config.noise.clone();
    if let Some(ref m) = args.mode {
        noise.mode = match m {
            ModeArg::PerPixel => NoiseMode::PerPixel,
            ModeArg::PairDifference => NoiseMode::PairDifference,
        };
    }
    if args.uncorrected {
        noise.correction = DifferenceCorrection::Uncorrected;
    }
    if let Some(sigma) = args.clip_sigma {
        noise.clip_sigma = sigma;
    }

    let master = super::load_master(args.master.as_deref())?;
    let frames = super::load_frames(&args.dir, config)?;
    let estimator = NoiseEstimator::new(noise);
    let estimate = estimator.estimate(&frames, master.as_ref())?;

    print_noise_summary(&estimate, estimator.config());

    if let Some(ref path) = args.field {
        match estimate.field {
            Some(ref field) => {
                write_fits(path, &Frame::new(field.clone()), FitsBitpix::F64)
                    .with_context(|| format!("Failed to write noise field to {}", path.display()))?;
                println!("Noise field saved to {}", path.display());
            }
            None => println!("No per-pixel field in pair-difference mode, --field ignored"),
        }
    }
    super::save_report(&estimate.summary, args.report.as_deref())
}
