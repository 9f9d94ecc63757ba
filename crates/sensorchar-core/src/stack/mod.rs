pub mod master;
pub mod reduce;
pub mod sigma_clip;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_STACK_SIGMA;

pub use master::{MasterFrame, MasterFrameBuilder};
pub use sigma_clip::{sigma_clip, ClipResult};

/// Per-pixel reducer applied across the clipped stack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackReducer {
    #[default]
    Mean,
    Median,
}

impl fmt::Display for StackReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => write!(f, "Mean"),
            Self::Median => write!(f, "Median"),
        }
    }
}

/// Value substituted for clipped samples before reduction.
///
/// `PerPixel` uses the surviving samples of that pixel; `Global` uses the
/// mean of every surviving sample in the whole stack. The two differ by a
/// few percent on real data, so one build always uses a single policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillPolicy {
    #[default]
    PerPixel,
    Global,
}

impl fmt::Display for FillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerPixel => write!(f, "Per-pixel"),
            Self::Global => write!(f, "Global"),
        }
    }
}

/// Parameters for building a master calibration frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterFrameParams {
    /// Symmetric clip threshold in standard deviations (default: 3.0).
    pub sigma: f64,
    /// Clip iterations; `None` repeats until no new sample is rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iters: Option<usize>,
    pub reducer: StackReducer,
    pub fill: FillPolicy,
}

impl Default for MasterFrameParams {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_STACK_SIGMA,
            max_iters: None,
            reducer: StackReducer::Mean,
            fill: FillPolicy::PerPixel,
        }
    }
}
