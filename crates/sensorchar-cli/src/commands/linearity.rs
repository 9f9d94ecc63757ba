use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sensorchar_core::config::AnalysisConfig;
use sensorchar_core::frame::Roi;
use sensorchar_core::linearity::LinearityEstimator;

use crate::summary::print_linearity_summary;

#[derive(Args)]
pub struct LinearityArgs {
    /// Directory of flat frames at several exposure times
    pub dir: PathBuf,

    /// Master dark subtracted from every flat
    #[arg(long)]
    pub dark: Option<PathBuf>,

    /// Region as ROW,COL,HEIGHT,WIDTH (default: full frame)
    #[arg(long, value_delimiter = ',', num_args = 4)]
    pub roi: Option<Vec<usize>>,

    /// Mean signal above which exposures are not fitted
    #[arg(long)]
    pub saturation: Option<f64>,

    /// Save the result as TOML
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &LinearityArgs, config: &AnalysisConfig) -> Result<()> {
    let mut linearity = config.linearity.clone();
    if let Some(ref v) = args.roi {
        linearity.roi = Some(Roi::new(v[0], v[1], v[2], v[3]));
    }
    if let Some(limit) = args.saturation {
        linearity.saturation_adu = limit;
    }

    let dark = super::load_master(args.dark.as_deref())?;
    let flats = super::load_group(&args.dir, &config.store.exposure_key, config)?;
    let result = LinearityEstimator::new(linearity).estimate(&flats, dark.as_ref())?;

    print_linearity_summary(&result);
    super::save_report(&result, args.report.as_deref())
}
