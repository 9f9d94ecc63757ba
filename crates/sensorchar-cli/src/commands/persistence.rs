use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use sensorchar_core::config::AnalysisConfig;
use sensorchar_core::persistence::track_persistence;

use crate::summary::print_persistence_summary;

#[derive(Args)]
pub struct PersistenceArgs {
    /// Directory of bias frames taken after an exposure to light
    pub dir: PathBuf,

    /// Seconds between consecutive frames
    #[arg(long, default_value = "1.0")]
    pub interval: f64,

    /// Save the result as TOML
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &PersistenceArgs, config: &AnalysisConfig) -> Result<()> {
    let store = config.store.open(&args.dir);
    let stream = store
        .stream()
        .with_context(|| format!("Failed to open {}", args.dir.display()))?;

    let pb = ProgressBar::new(stream.size_hint().0 as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message("Tracking");

    let result = track_persistence(stream.inspect(|_| pb.inc(1)), args.interval)?;
    pb.finish_with_message("Done");

    print_persistence_summary(&result);
    super::save_report(&result, args.report.as_deref())
}
