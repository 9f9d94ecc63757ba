mod commands;
mod summary;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sensorchar", about = "CMOS image sensor characterization")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Analysis config (TOML); defaults are used for anything it leaves out
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the frames and header tags of a directory
    Info(commands::info::InfoArgs),
    /// Combine a stack into a sigma-clipped master frame
    Master(commands::master::MasterArgs),
    /// Readout noise from bias frames
    Ron(commands::ron::RonArgs),
    /// Dark current from darks at several exposure times
    Dark(commands::dark::DarkArgs),
    /// Conversion gain from a photon transfer curve
    Ptc(commands::ptc::PtcArgs),
    /// Signal response against exposure time
    Linearity(commands::linearity::LinearityArgs),
    /// Mean level of a bias sequence over time
    Persistence(commands::persistence::PersistenceArgs),
    /// Locate and trace random telegraph noise pixels
    Telegraph(commands::telegraph::TelegraphArgs),
    /// Spectral response and quantum efficiency
    Qe(commands::qe::QeArgs),
    /// Frames needed for a target margin of error
    SampleSize(commands::sample_size::SampleSizeArgs),
    /// Print or save the effective analysis config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = commands::load_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::Info(args) => commands::info::run(args, &config),
        Commands::Master(args) => commands::master::run(args, &config),
        Commands::Ron(args) => commands::ron::run(args, &config),
        Commands::Dark(args) => commands::dark::run(args, &config),
        Commands::Ptc(args) => commands::ptc::run(args, &config),
        Commands::Linearity(args) => commands::linearity::run(args, &config),
        Commands::Persistence(args) => commands::persistence::run(args, &config),
        Commands::Telegraph(args) => commands::telegraph::run(args, &config),
        Commands::Qe(args) => commands::qe::run(args, &config),
        Commands::SampleSize(args) => commands::sample_size::run(args),
        Commands::Config(args) => commands::config::run(args, &config),
    }
}
