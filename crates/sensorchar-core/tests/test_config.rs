use sensorchar_core::config::{AnalysisConfig, StoreConfig};
use sensorchar_core::dark::DarkMethod;
use sensorchar_core::fit::FitFamily;
use sensorchar_core::noise::{DifferenceCorrection, NoiseMode};
use sensorchar_core::series::MetricSeries;
use sensorchar_core::stack::{FillPolicy, StackReducer};

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[test]
fn test_stack_enum_display() {
    assert_eq!(format!("{}", StackReducer::Mean), "Mean");
    assert_eq!(format!("{}", StackReducer::Median), "Median");
    assert_eq!(format!("{}", FillPolicy::PerPixel), "Per-pixel");
    assert_eq!(format!("{}", FillPolicy::Global), "Global");
}

#[test]
fn test_noise_enum_display() {
    assert_eq!(format!("{}", NoiseMode::PerPixel), "Per-pixel");
    assert_eq!(format!("{}", NoiseMode::PairDifference), "Pair difference");
    assert_eq!(format!("{}", DifferenceCorrection::Sqrt2), "1/sqrt(2)");
    assert_eq!(format!("{}", DifferenceCorrection::Uncorrected), "None");
}

#[test]
fn test_dark_method_display() {
    assert_eq!(
        format!("{}", DarkMethod::FrameDifference { read_noise: None }),
        "Frame difference"
    );
    assert_eq!(
        format!(
            "{}",
            DarkMethod::FrameDifference {
                read_noise: Some(1.5)
            }
        ),
        "Frame difference (RON 1.5 ADU)"
    );
    assert_eq!(format!("{}", DarkMethod::BiasSubtraction), "Bias subtraction");
    assert_eq!(format!("{}", FitFamily::Logarithmic), "Logarithmic");
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[test]
fn test_defaults() {
    let config = AnalysisConfig::default();
    assert_eq!(config.stacking.sigma, 3.0);
    assert_eq!(config.stacking.max_iters, None);
    assert_eq!(config.noise.clip_sigma, 10.0);
    assert_eq!(config.noise.correction, DifferenceCorrection::Sqrt2);
    assert_eq!(config.ptc.roi_size, (300, 300));
    assert_eq!(config.ptc.saturation_adu, 4050.0);
    assert_eq!(config.telegraph.sigma, 12.0);
    assert_eq!(config.telegraph.window, 50);
    assert_eq!(config.dark.method, DarkMethod::FrameDifference { read_noise: None });
}

#[test]
fn test_store_defaults() {
    let store = StoreConfig::default();
    assert_eq!(store.exposure_key, "EXPTIME");
    assert_eq!(store.temperature_key, "CCD-TEMP");
    assert_eq!(store.readout_mode_key, "READOUTM");
    assert_eq!(store.wavelength_key, "WAVELEN");
    assert!(store.extensions.iter().any(|e| e == "fits"));
    assert!(store.extensions.iter().any(|e| e == "tif"));
}

// ---------------------------------------------------------------------------
// TOML
// ---------------------------------------------------------------------------

#[test]
fn test_toml_roundtrip() {
    let config = AnalysisConfig::default();
    let text = toml::to_string_pretty(&config).unwrap();
    let parsed: AnalysisConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let text = r#"
[noise]
mode = "PairDifference"

[stacking]
sigma = 2.5
reducer = "Median"
"#;
    let config: AnalysisConfig = toml::from_str(text).unwrap();
    assert_eq!(config.noise.mode, NoiseMode::PairDifference);
    assert_eq!(config.noise.clip_sigma, 10.0);
    assert_eq!(config.stacking.sigma, 2.5);
    assert_eq!(config.stacking.reducer, StackReducer::Median);
    assert_eq!(config.stacking.fill, FillPolicy::PerPixel);
    assert_eq!(config.store.exposure_key, "EXPTIME");
}

#[test]
fn test_dark_method_from_toml() {
    let text = r#"
[dark]
fit = "Logarithmic"

[dark.method.FrameDifference]
read_noise = 2.5
"#;
    let config: AnalysisConfig = toml::from_str(text).unwrap();
    assert_eq!(
        config.dark.method,
        DarkMethod::FrameDifference {
            read_noise: Some(2.5)
        }
    );
    assert_eq!(config.dark.fit, FitFamily::Logarithmic);

    let config: AnalysisConfig = toml::from_str("[dark]\nmethod = \"BiasSubtraction\"\n").unwrap();
    assert_eq!(config.dark.method, DarkMethod::BiasSubtraction);
}

#[test]
fn test_qe_irradiance_table_from_toml() {
    let text = r#"
[qe]
gain = 1.8
irradiance = [[450.0, 0.012], [550.0, 0.015]]
"#;
    let config: AnalysisConfig = toml::from_str(text).unwrap();
    assert_eq!(config.qe.gain, Some(1.8));
    assert_eq!(config.qe.irradiance, vec![(450.0, 0.012), (550.0, 0.015)]);
    assert_eq!(config.qe.pixel_pitch_um, 3.76);
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[test]
fn test_series_json_keeps_labels() {
    let series = MetricSeries::from_points("exposure [s]", "signal [ADU]", [(2.0, 20.0), (1.0, 10.0)])
        .unwrap();
    let json = serde_json::to_string(&series).unwrap();
    let back: MetricSeries = serde_json::from_str(&json).unwrap();
    assert_eq!(back, series);
    assert_eq!(back.x_label, "exposure [s]");
    assert_eq!(back.xs(), vec![1.0, 2.0]);
}
