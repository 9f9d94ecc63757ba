use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sensorchar_core::config::AnalysisConfig;
use sensorchar_core::frame::{Frame, Roi};
use sensorchar_core::gain::GainEstimator;
use sensorchar_core::io::{write_fits, FitsBitpix};

use crate::summary::print_ptc_summary;

#[derive(Args)]
pub struct PtcArgs {
    /// Directory of flat frames at several illumination levels
    pub dir: PathBuf,

    /// Master dark subtracted from every flat
    #[arg(long)]
    pub dark: Option<PathBuf>,

    /// Header tag that separates the illumination levels
    #[arg(long)]
    pub level_key: Option<String>,

    /// Region as ROW,COL,HEIGHT,WIDTH (default: centered region from config)
    #[arg(long, value_delimiter = ',', num_args = 4)]
    pub roi: Option<Vec<usize>>,

    /// Mean level above which points are not fitted
    #[arg(long)]
    pub saturation: Option<f64>,

    /// Write a per-tile gain map to a FITS file
    #[arg(long)]
    pub gain_map: Option<PathBuf>,

    /// Tile edge for the gain map
    #[arg(long)]
    pub block: Option<usize>,

    /// Save the result as TOML
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &PtcArgs, config: &AnalysisConfig) -> Result<()> {
    let mut ptc = config.ptc.clone();
    if let Some(limit) = args.saturation {
        ptc.saturation_adu = limit;
    }
    if let Some(block) = args.block {
        ptc.gain_map_block = block;
    }
    let roi = args
        .roi
        .as_deref()
        .map(|v| Roi::new(v[0], v[1], v[2], v[3]));
    let key = args
        .level_key
        .as_deref()
        .unwrap_or(&config.store.exposure_key);

    let dark = super::load_master(args.dark.as_deref())?;
    let flats = super::load_group(&args.dir, key, config)?;
    let estimator = GainEstimator::new(ptc);
    let result = estimator.estimate(&flats, dark.as_ref(), roi)?;

    print_ptc_summary(&result);

    if let Some(ref path) = args.gain_map {
        let block = estimator.config().gain_map_block;
        let map = estimator.gain_map(&flats, dark.as_ref(), block)?;
        let (rows, cols) = map.dim();
        write_fits(path, &Frame::new(map), FitsBitpix::F64)
            .with_context(|| format!("Failed to write gain map to {}", path.display()))?;
        println!("Gain map ({cols}x{rows} tiles of {block} px) saved to {}", path.display());
    }
    super::save_report(&result, args.report.as_deref())
}
