use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sensorchar_core::config::AnalysisConfig;
use sensorchar_core::io::load_frame;

#[derive(Args)]
pub struct InfoArgs {
    /// Directory of frame files
    pub dir: PathBuf,
}

pub fn run(args: &InfoArgs, config: &AnalysisConfig) -> Result<()> {
    let store = config.store.open(&args.dir);
    let paths = store.paths()?;
    let Some(first) = paths.first() else {
        println!("No frame files in {}", args.dir.display());
        return Ok(());
    };
    let frame = load_frame(first)?;
    let (rows, cols) = frame.shape();

    println!("Directory:   {}", args.dir.display());
    println!("Frames:      {}", paths.len());
    println!("Dimensions:  {}x{}", cols, rows);
    println!("First file:  {}", first.display());
    let total_mb = store.decoded_bytes()? as f64 / (1024.0 * 1024.0);
    println!("Decoded:     {:.1} MB", total_mb);

    let keys = [
        ("Exposure", &config.store.exposure_key),
        ("Temperature", &config.store.temperature_key),
        ("Readout", &config.store.readout_mode_key),
        ("Wavelength", &config.store.wavelength_key),
    ];
    for (label, key) in keys {
        if let Some(value) = frame.header.get(key) {
            println!("{:<13}{} = {}", format!("{label}:"), key, value);
        }
    }

    if !frame.header.is_empty() {
        println!();
        println!("Header tags of the first frame:");
        for (key, value) in frame.header.iter() {
            println!("  {:<8} = {}", key, value);
        }
    }

    Ok(())
}
