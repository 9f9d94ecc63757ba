use serde::{Deserialize, Serialize};

use crate::dark::DarkConfig;
use crate::gain::PtcConfig;
use crate::io::store::{FrameStore, FITS_EXTENSIONS, IMAGE_EXTENSIONS};
use crate::linearity::LinearityConfig;
use crate::noise::NoiseConfig;
use crate::qe::QeConfig;
use crate::stack::MasterFrameParams;
use crate::telegraph::TelegraphConfig;

/// Complete analysis settings, one section per measurement.
///
/// Every section falls back to its defaults, so a config file only needs
/// the values it changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub store: StoreConfig,
    pub stacking: MasterFrameParams,
    pub noise: NoiseConfig,
    pub dark: DarkConfig,
    pub ptc: PtcConfig,
    pub linearity: LinearityConfig,
    pub telegraph: TelegraphConfig,
    pub qe: QeConfig,
}

/// Which files are frames and which header tags carry the acquisition settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub extensions: Vec<String>,
    pub exposure_key: String,
    pub temperature_key: String,
    pub readout_mode_key: String,
    pub wavelength_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            extensions: FITS_EXTENSIONS
                .iter()
                .chain(IMAGE_EXTENSIONS)
                .map(|e| e.to_string())
                .collect(),
            exposure_key: "EXPTIME".into(),
            temperature_key: "CCD-TEMP".into(),
            readout_mode_key: "READOUTM".into(),
            wavelength_key: "WAVELEN".into(),
        }
    }
}

impl StoreConfig {
    /// A store over `dir` accepting the configured extensions.
    pub fn open(&self, dir: impl Into<std::path::PathBuf>) -> FrameStore {
        FrameStore::new(dir).with_extensions(self.extensions.as_slice())
    }
}
