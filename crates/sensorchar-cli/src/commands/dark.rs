use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sensorchar_core::config::AnalysisConfig;
use sensorchar_core::dark::{DarkCurrentEstimator, DarkMethod};
use sensorchar_core::fit::FitFamily;

use crate::summary::print_dark_summary;

#[derive(Args)]
pub struct DarkArgs {
    /// Directory of dark frames at several exposure times
    pub dir: PathBuf,

    /// Subtract this master bias instead of differencing frame pairs
    #[arg(long)]
    pub bias: Option<PathBuf>,

    /// Read noise in ADU removed in quadrature (frame-difference method)
    #[arg(long, conflicts_with = "bias")]
    pub read_noise: Option<f64>,

    /// Fit dark signal against ln(t) instead of t
    #[arg(long)]
    pub log: bool,

    /// Header tag holding the exposure time
    #[arg(long)]
    pub exposure_key: Option<String>,

    /// Save the result as TOML
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &DarkArgs, config: &AnalysisConfig) -> Result<()> {
    let mut dark = config.dark.clone();
    if args.bias.is_some() {
        dark.method = DarkMethod::BiasSubtraction;
    } else if let Some(rn) = args.read_noise {
        dark.method = DarkMethod::FrameDifference {
            read_noise: Some(rn),
        };
    }
    if args.log {
        dark.fit = FitFamily::Logarithmic;
    }
    let key = args
        .exposure_key
        .as_deref()
        .unwrap_or(&config.store.exposure_key);

    let bias = super::load_master(args.bias.as_deref())?;
    let darks = super::load_group(&args.dir, key, config)?;
    let estimator = DarkCurrentEstimator::new(dark);
    let result = estimator.estimate(&darks, bias.as_ref())?;

    print_dark_summary(&result, estimator.config().method);
    super::save_report(&result, args.report.as_deref())
}
