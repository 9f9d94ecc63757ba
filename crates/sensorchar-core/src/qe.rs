use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::{PLANCK, SPEED_OF_LIGHT};
use crate::error::{Result, SensorError};
use crate::frame::FrameGroup;
use crate::series::MetricSeries;
use crate::stack::MasterFrame;

/// Wavelengths closer than this (nm) are treated as the same reference entry.
const WAVELENGTH_TOLERANCE_NM: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QeConfig {
    /// Conversion gain in e⁻/ADU, typically from the PTC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,
    /// Pixel edge in micrometres.
    pub pixel_pitch_um: f64,
    /// Calibrated irradiance at the sensor: (wavelength nm, W/m²).
    pub irradiance: Vec<(f64, f64)>,
}

impl Default for QeConfig {
    fn default() -> Self {
        Self {
            gain: None,
            pixel_pitch_um: 3.76,
            irradiance: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QeResult {
    /// Dark-corrected signal rate per wavelength (ADU/s).
    pub response: MetricSeries,
    /// Quantum efficiency per wavelength, when gain and irradiance are known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qe: Option<MetricSeries>,
}

/// Spectral response from light frames grouped by wavelength.
#[derive(Clone, Debug, Default)]
pub struct QeEstimator {
    config: QeConfig,
}

impl QeEstimator {
    pub fn new(config: QeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QeConfig {
        &self.config
    }

    /// Response per wavelength, plus QE when the config carries a gain and
    /// an irradiance table.
    pub fn estimate(
        &self,
        lights: &FrameGroup,
        master_dark: Option<&MasterFrame>,
        exposure_key: &str,
    ) -> Result<QeResult> {
        let response = wavelength_response(lights, master_dark, exposure_key)?;
        let qe = match self.config.gain {
            Some(gain) if !self.config.irradiance.is_empty() => {
                let reference = MetricSeries::from_points(
                    "wavelength [nm]",
                    "irradiance [W/m^2]",
                    self.config.irradiance.iter().copied(),
                )?;
                Some(quantum_efficiency(
                    &response,
                    &reference,
                    gain,
                    self.config.pixel_pitch_um,
                )?)
            }
            _ => None,
        };
        Ok(QeResult { response, qe })
    }
}

/// Mean signal rate (ADU/s) per wavelength.
///
/// Each frame contributes `(mean - dark mean) / t`, with t read from the
/// frame's `exposure_key` tag.
pub fn wavelength_response(
    lights: &FrameGroup,
    master_dark: Option<&MasterFrame>,
    exposure_key: &str,
) -> Result<MetricSeries> {
    let dark_level = master_dark.map(|d| d.frame().mean()).unwrap_or(0.0);
    if let (Some(shape), Some(dark)) = (lights.shape(), master_dark) {
        if shape != dark.shape() {
            return Err(SensorError::shape("master dark", shape, dark.shape()));
        }
    }

    let mut points = Vec::with_capacity(lights.len());
    for (key, frames) in lights.iter() {
        let wavelength = key.as_f64().ok_or_else(|| {
            SensorError::InvalidParameter(format!("wavelength '{key}' is not numeric"))
        })?;
        let mut sum = 0.0;
        for frame in frames {
            let t = frame
                .header
                .get_f64(exposure_key)
                .ok_or_else(|| SensorError::MissingMetadata {
                    path: frame.source.clone().unwrap_or_default(),
                    key: exposure_key.to_string(),
                })?;
            if !(t > 0.0) {
                return Err(SensorError::InvalidParameter(format!(
                    "exposure {t} s in {} must be > 0",
                    frame.label()
                )));
            }
            sum += (frame.mean() - dark_level) / t;
        }
        let rate = sum / frames.len() as f64;
        debug!(wavelength, rate, frames = frames.len(), "Spectral response");
        points.push((wavelength, rate));
    }

    let series = MetricSeries::from_points("wavelength [nm]", "response [ADU/s]", points)?;
    info!(wavelengths = series.len(), "Spectral response measured");
    Ok(series)
}

/// Electrons per second over incident photons per second, per pixel.
///
/// Photon rate is `E·A·λ / (h·c)` with E from `irradiance` (W/m²) and A the
/// pixel area. Every response wavelength must appear in `irradiance`.
pub fn quantum_efficiency(
    response: &MetricSeries,
    irradiance: &MetricSeries,
    gain: f64,
    pixel_pitch_um: f64,
) -> Result<MetricSeries> {
    if !(gain > 0.0) {
        return Err(SensorError::InvalidParameter(format!("gain must be > 0, got {gain}")));
    }
    if !(pixel_pitch_um > 0.0) {
        return Err(SensorError::InvalidParameter(format!(
            "pixel pitch must be > 0, got {pixel_pitch_um}"
        )));
    }
    let pitch_m = pixel_pitch_um * 1e-6;
    let area = pitch_m * pitch_m;

    let points = response
        .points()
        .iter()
        .map(|p| -> Result<(f64, f64)> {
            let e = irradiance
                .points()
                .iter()
                .find(|r| (r.x - p.x).abs() < WAVELENGTH_TOLERANCE_NM)
                .map(|r| r.y)
                .ok_or_else(|| {
                    SensorError::InvalidParameter(format!(
                        "no reference irradiance at {} nm",
                        p.x
                    ))
                })?;
            let photons = e * area * p.x * 1e-9 / (PLANCK * SPEED_OF_LIGHT);
            if !(photons > 0.0) {
                return Err(SensorError::InvalidParameter(format!(
                    "reference irradiance at {} nm must be > 0",
                    p.x
                )));
            }
            Ok((p.x, p.y * gain / photons))
        })
        .collect::<Result<Vec<_>>>()?;

    MetricSeries::from_points("wavelength [nm]", "QE", points)
}
