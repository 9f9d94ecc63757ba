use anyhow::Result;
use clap::Args;
use sensorchar_core::consts::DEFAULT_Z_SCORE;
use sensorchar_core::noise::{margin_of_error, required_sample_size};

#[derive(Args)]
pub struct SampleSizeArgs {
    /// Noise of a single sample (ADU)
    #[arg(long)]
    pub sigma: f64,

    /// z-score of the confidence level
    #[arg(long, default_value_t = DEFAULT_Z_SCORE)]
    pub z: f64,

    /// Target margin of error (ADU)
    #[arg(long, default_value = "0.02")]
    pub moe: f64,

    /// Report the margin of error for this many frames instead
    #[arg(long)]
    pub frames: Option<usize>,
}

pub fn run(args: &SampleSizeArgs) -> Result<()> {
    match args.frames {
        Some(n) => {
            let moe = margin_of_error(args.sigma, args.z, n)?;
            println!(
                "Margin of error with {n} frames (sigma={}, z={}): {moe:.5} ADU",
                args.sigma, args.z
            );
        }
        None => {
            let n = required_sample_size(args.sigma, args.z, args.moe)?;
            println!(
                "Frames needed for +/-{} ADU (sigma={}, z={}): {} ({n:.2})",
                args.moe,
                args.sigma,
                args.z,
                n.ceil() as u64
            );
        }
    }
    Ok(())
}
