use std::fmt::Display;

use console::Style;
use sensorchar_core::dark::{DarkCurrentResult, DarkMethod};
use sensorchar_core::fit::FitResult;
use sensorchar_core::gain::PtcResult;
use sensorchar_core::linearity::LinearityResult;
use sensorchar_core::noise::{NoiseConfig, NoiseEstimate};
use sensorchar_core::persistence::PersistenceResult;
use sensorchar_core::qe::QeResult;
use sensorchar_core::series::MetricSeries;
use sensorchar_core::stack::MasterFrame;
use sensorchar_core::telegraph::TelegraphResult;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
        }
    }

    fn title(&self, text: &str) {
        println!();
        println!("  {}", self.title.apply_to(text));
        println!("  {}", self.title.apply_to("\u{2550}".repeat(text.chars().count())));
        println!();
    }

    fn row(&self, label: &str, value: impl Display) {
        println!("  {:<14}{}", self.label.apply_to(label), self.value.apply_to(value));
    }

    fn method_row(&self, label: &str, method: impl Display) {
        println!("  {:<14}{}", self.label.apply_to(label), self.method.apply_to(method));
    }

    fn sub_row(&self, label: &str, value: impl Display) {
        println!("    {:<12}{}", self.label.apply_to(label), self.value.apply_to(value));
    }

    fn fit(&self, fit: &FitResult) {
        println!("  {}", self.header.apply_to("Fit"));
        self.sub_row("Family", fit.family);
        self.sub_row("Slope", format!("{:.6}", fit.slope));
        self.sub_row("Intercept", format!("{:.4}", fit.intercept));
        self.sub_row("R\u{b2}", format!("{:.5}", fit.r_squared));
        self.sub_row(
            "Domain",
            format!("{:.3} .. {:.3} ({} points)", fit.domain.0, fit.domain.1, fit.points_used),
        );
    }

    fn series(&self, series: &MetricSeries) {
        println!(
            "  {}",
            self.header
                .apply_to(format!("{} vs {}", series.y_label, series.x_label))
        );
        for p in series.points() {
            println!(
                "    {:>12.4}  {}",
                self.label.apply_to(p.x),
                self.value.apply_to(format!("{:.4}", p.y))
            );
        }
    }
}

pub fn print_master_summary(master: &MasterFrame) {
    let s = Styles::new();
    let params = master.params();
    let (rows, cols) = master.shape();

    s.title("Master Frame");
    s.row("Frames", master.frame_count());
    s.row("Dimensions", format!("{cols}x{rows}"));
    s.method_row("Reducer", params.reducer);
    s.method_row("Fill", params.fill);
    s.row("Clip sigma", params.sigma);
    match params.max_iters {
        Some(n) => s.row("Iterations", n),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Iterations"),
            s.disabled.apply_to("until converged")
        ),
    }
    s.row("Mean", format!("{:.3} ADU", master.frame().mean()));
    println!();
}

pub fn print_noise_summary(estimate: &NoiseEstimate, config: &NoiseConfig) {
    let s = Styles::new();
    let sum = &estimate.summary;

    s.title("Readout Noise");
    s.method_row("Mode", config.mode);
    s.method_row("Correction", config.correction);
    s.row("Clip sigma", config.clip_sigma);
    println!();
    println!("  {}", s.header.apply_to("Noise [ADU]"));
    s.sub_row("Median", format!("{:.4}", sum.median));
    s.sub_row("Mean", format!("{:.4}", sum.mean));
    s.sub_row("Min", format!("{:.4}", sum.min));
    s.sub_row("Max", format!("{:.4}", sum.max));
    s.sub_row("Kept", format!("{} / {}", sum.kept, sum.total));
    println!();
}

pub fn print_dark_summary(result: &DarkCurrentResult, method: DarkMethod) {
    let s = Styles::new();

    s.title("Dark Current");
    s.method_row("Method", method);
    s.row("Rate", format!("{:.5} ADU/s", result.rate));
    println!();
    s.series(&result.series);
    println!();
    s.fit(&result.fit);
    println!();
    s.series(&result.pointwise);
    println!();
}

pub fn print_ptc_summary(result: &PtcResult) {
    let s = Styles::new();
    let roi = result.roi;

    s.title("Photon Transfer Curve");
    s.row(
        "ROI",
        format!("{}x{} at ({}, {})", roi.width, roi.height, roi.col, roi.row),
    );
    s.row("Gain", format!("{:.4} e-/ADU", result.gain));
    s.row(
        "Read noise",
        format!(
            "{:.3} ADU ({:.3} e-)",
            result.read_noise_adu, result.read_noise_electrons
        ),
    );
    println!();
    s.series(&result.series);
    if !result.excluded.is_empty() {
        println!(
            "    {}",
            s.disabled
                .apply_to(format!("{} saturated levels not fitted", result.excluded.len()))
        );
    }
    println!();
    s.fit(&result.fit);
    println!();
}

pub fn print_linearity_summary(result: &LinearityResult) {
    let s = Styles::new();

    s.title("Linearity");
    s.row(
        "Response",
        format!("{:.4} ADU/s", result.fit.slope),
    );
    s.row(
        "Nonlinearity",
        format!("{:.3} %", result.max_nonlinearity_pct),
    );
    println!();
    s.series(&result.series);
    if !result.excluded.is_empty() {
        println!(
            "    {}",
            s.disabled
                .apply_to(format!("{} saturated exposures not fitted", result.excluded.len()))
        );
    }
    println!();
    s.fit(&result.fit);
    println!();
}

pub fn print_persistence_summary(result: &PersistenceResult) {
    let s = Styles::new();

    s.title("Charge Persistence");
    s.row("Frames", result.series.len());
    s.row("First", format!("{:.4} ADU", result.first));
    s.row("Last", format!("{:.4} ADU", result.last));
    s.row("Range", format!("{:.4} .. {:.4} ADU", result.min, result.max));
    s.row("Decay", format!("{:.4} ADU", result.decay));
    println!();
}

pub fn print_telegraph_summary(result: &TelegraphResult) {
    let s = Styles::new();

    s.title("Telegraph Pixels");
    s.row("Threshold", format!("{:.3} ADU", result.threshold));
    s.row("Flagged", result.flagged.len());
    if let Some(swing) = result.max_flagged_swing() {
        s.row("Max swing", format!("{swing:.3} ADU"));
    }
    match result.window {
        Some(w) => s.row(
            "Window",
            format!("{}x{} at ({}, {})", w.width, w.height, w.col, w.row),
        ),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Window"),
            s.disabled.apply_to("none")
        ),
    }
    if !result.flagged.is_empty() {
        println!();
        println!("  {}", s.header.apply_to("Flagged (row, col)"));
        for &(r, c) in result.flagged.iter().take(20) {
            println!(
                "    ({r}, {c})  {}",
                s.value
                    .apply_to(format!("{:.3}", result.peak_to_peak[[r, c]]))
            );
        }
        if result.flagged.len() > 20 {
            println!(
                "    {}",
                s.disabled
                    .apply_to(format!("... {} more", result.flagged.len() - 20))
            );
        }
    }
    println!();
}

pub fn print_qe_summary(result: &QeResult) {
    let s = Styles::new();

    s.title("Spectral Response");
    s.series(&result.response);
    println!();
    match result.qe {
        Some(ref qe) => s.series(qe),
        None => println!(
            "  {}",
            s.disabled
                .apply_to("QE not computed: needs a gain and an irradiance table")
        ),
    }
    println!();
}
