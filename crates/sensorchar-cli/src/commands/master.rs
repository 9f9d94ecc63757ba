use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use sensorchar_core::config::AnalysisConfig;
use sensorchar_core::consts::{DEFAULT_BLOCK_ROWS, LOW_MEMORY_THRESHOLD_BYTES};
use sensorchar_core::io::store::is_fits;
use sensorchar_core::stack::{FillPolicy, MasterFrameBuilder, StackReducer};
use tracing::debug;

use crate::summary::print_master_summary;

#[derive(Clone, ValueEnum)]
pub enum ReducerArg {
    Mean,
    Median,
}

#[derive(Clone, ValueEnum)]
pub enum FillArg {
    PerPixel,
    Global,
}

#[derive(Args)]
pub struct MasterArgs {
    /// Directory of frames to combine
    pub dir: PathBuf,

    /// Output FITS file
    #[arg(short, long, default_value = "master.fits")]
    pub output: PathBuf,

    /// Clipping threshold in standard deviations
    #[arg(long)]
    pub sigma: Option<f64>,

    /// Maximum clipping passes (0 disables clipping)
    #[arg(long)]
    pub max_iters: Option<usize>,

    /// Reducer applied to the clipped stack
    #[arg(long, value_enum)]
    pub reducer: Option<ReducerArg>,

    /// Value substituted for rejected samples
    #[arg(long, value_enum)]
    pub fill: Option<FillArg>,

    /// Stream FITS frames in row bands regardless of stack size
    #[arg(long)]
    pub low_memory: bool,

    /// Rows decoded per band when streaming
    #[arg(long, default_value_t = DEFAULT_BLOCK_ROWS)]
    pub block_rows: usize,
}

pub fn run(args: &MasterArgs, config: &AnalysisConfig) -> Result<()> {
    let mut params = config.stacking.clone();
    if let Some(sigma) = args.sigma {
        params.sigma = sigma;
    }
    if let Some(n) = args.max_iters {
        params.max_iters = Some(n);
    }
    if let Some(ref r) = args.reducer {
        params.reducer = match r {
            ReducerArg::Mean => StackReducer::Mean,
            ReducerArg::Median => StackReducer::Median,
        };
    }
    if let Some(ref f) = args.fill {
        params.fill = match f {
            FillArg::PerPixel => FillPolicy::PerPixel,
            FillArg::Global => FillPolicy::Global,
        };
    }
    let builder = MasterFrameBuilder::new(params);

    let store = config.store.open(&args.dir);
    let paths = store.paths()?;
    let all_fits = !paths.is_empty() && paths.iter().all(|p| is_fits(p));
    let bytes = store.decoded_bytes()?;
    let stream = all_fits && (args.low_memory || bytes > LOW_MEMORY_THRESHOLD_BYTES);
    debug!(frames = paths.len(), bytes, all_fits, stream, "Master build mode");

    let master = if stream {
        println!(
            "Streaming {} frames ({:.1} MB decoded) in bands of {} rows",
            paths.len(),
            bytes as f64 / (1024.0 * 1024.0),
            args.block_rows
        );
        builder.build_streaming(&paths, args.block_rows)?
    } else {
        if args.low_memory {
            println!("Low-memory mode needs FITS input, loading frames instead");
        }
        let frames = super::load_frames(&args.dir, config)?;
        builder.build(&frames)?
    };

    print_master_summary(&master);
    master
        .save(&args.output)
        .with_context(|| format!("Failed to save master to {}", args.output.display()))?;
    println!("Saved to {}", args.output.display());
    Ok(())
}
