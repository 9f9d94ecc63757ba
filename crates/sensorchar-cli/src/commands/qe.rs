use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sensorchar_core::config::AnalysisConfig;
use sensorchar_core::qe::QeEstimator;

use crate::summary::print_qe_summary;

#[derive(Args)]
pub struct QeArgs {
    /// Directory of light frames at several wavelengths
    pub dir: PathBuf,

    /// Master dark subtracted from the frame means
    #[arg(long)]
    pub dark: Option<PathBuf>,

    /// Conversion gain in e-/ADU (overrides the config)
    #[arg(long)]
    pub gain: Option<f64>,

    /// Pixel pitch in micrometres (overrides the config)
    #[arg(long)]
    pub pixel_pitch: Option<f64>,

    /// Save the result as TOML
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &QeArgs, config: &AnalysisConfig) -> Result<()> {
    let mut qe = config.qe.clone();
    if args.gain.is_some() {
        qe.gain = args.gain;
    }
    if let Some(pitch) = args.pixel_pitch {
        qe.pixel_pitch_um = pitch;
    }

    let dark = super::load_master(args.dark.as_deref())?;
    let lights = super::load_group(&args.dir, &config.store.wavelength_key, config)?;
    let result =
        QeEstimator::new(qe).estimate(&lights, dark.as_ref(), &config.store.exposure_key)?;

    print_qe_summary(&result);
    super::save_report(&result, args.report.as_deref())
}
