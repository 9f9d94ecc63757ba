pub mod config;
pub mod dark;
pub mod info;
pub mod linearity;
pub mod master;
pub mod persistence;
pub mod ptc;
pub mod qe;
pub mod ron;
pub mod sample_size;
pub mod telegraph;

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use sensorchar_core::config::AnalysisConfig;
use sensorchar_core::frame::{Frame, FrameGroup};
use sensorchar_core::stack::MasterFrame;

/// Read the analysis config, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&contents).context("Invalid analysis config")
        }
        None => Ok(AnalysisConfig::default()),
    }
}

fn progress(len: usize, msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message(msg.to_string());
    Ok(pb)
}

/// Load every frame of `dir` in capture order.
pub fn load_frames(dir: &Path, config: &AnalysisConfig) -> Result<Vec<Frame>> {
    let store = config.store.open(dir);
    let stream = store
        .stream()
        .with_context(|| format!("Failed to open {}", dir.display()))?;
    let pb = progress(stream.size_hint().0, "Loading frames")?;

    let mut frames = Vec::new();
    for frame in stream {
        frames.push(frame?);
        pb.inc(1);
    }
    pb.finish_with_message(format!("Loaded {} frames", frames.len()));
    Ok(frames)
}

/// Load every frame of `dir` grouped by the header tag `key`.
pub fn load_group(dir: &Path, key: &str, config: &AnalysisConfig) -> Result<FrameGroup> {
    let store = config.store.open(dir);
    let stream = store
        .stream()
        .with_context(|| format!("Failed to open {}", dir.display()))?;
    let pb = progress(stream.size_hint().0, "Loading frames")?;

    let mut group = FrameGroup::new(key);
    for frame in stream {
        let frame = frame?;
        let value = frame.group_key(key)?;
        group.insert(value, frame)?;
        pb.inc(1);
    }
    pb.finish_with_message(format!(
        "Loaded {} frames in {} groups of {key}",
        group.frame_count(),
        group.len()
    ));
    Ok(group)
}

pub fn load_master(path: Option<&Path>) -> Result<Option<MasterFrame>> {
    path.map(|p| {
        MasterFrame::load(p).with_context(|| format!("Failed to load master {}", p.display()))
    })
    .transpose()
}

/// Save a report as TOML when a path is given.
pub fn save_report<T: Serialize>(report: &T, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        let text = toml::to_string_pretty(report)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report saved to {}", path.display());
    }
    Ok(())
}
