//! detect_image - annotate one still image and write the result

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use live_detect::annotate::{percent_to_cutoff, save_image};
use live_detect::pipeline::{process_image_file, DetectionContext};
use live_detect::{AppConfig, ConfigOverrides};

#[path = "../ui.rs"]
#[allow(dead_code)]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image to run detection on (png, jpg, jpeg).
    input: PathBuf,
    /// Where to write the annotated image; `.png` is added when no extension is given.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Confidence threshold in percent (0-100).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: Option<u8>,
    /// ONNX model file.
    #[arg(long, env = "LIVE_DETECT_MODEL")]
    model: Option<PathBuf>,
    /// Labels file, one class name per line.
    #[arg(long, env = "LIVE_DETECT_LABELS")]
    labels: Option<PathBuf>,
    /// Detector backend (tract|stub).
    #[arg(long)]
    backend: Option<String>,
    /// Color assignment (random|hashed|seeded:<n>).
    #[arg(long)]
    color_mode: Option<String>,
    /// Person box color as r,g,b.
    #[arg(long, value_name = "R,G,B")]
    person_color: Option<String>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = AppConfig::load()?;
    cfg.apply_overrides(&ConfigOverrides {
        model_path: args.model.clone(),
        labels_path: args.labels.clone(),
        backend: args.backend.clone(),
        threshold_percent: args.threshold,
        color_mode: args.color_mode.clone(),
        person_color: args.person_color.clone(),
        ..ConfigOverrides::default()
    })?;

    let mut context = {
        let _stage = ui.stage("Load detector");
        DetectionContext::from_config(&cfg)?
    };

    let cutoff = percent_to_cutoff(cfg.threshold_percent);
    let outcome = {
        let _stage = ui.stage("Detect objects");
        process_image_file(&mut context, &args.input, cutoff)?
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input));
    let written = {
        let _stage = ui.stage("Save annotated image");
        save_image(&outcome.image, &output)?
    };

    for rendered in &outcome.rendered {
        log::info!(
            "{} {:.2} at ({:.0}, {:.0}, {:.0}, {:.0})",
            rendered.label,
            rendered.confidence,
            rendered.bbox.x1,
            rendered.bbox.y1,
            rendered.bbox.x2,
            rendered.bbox.y2
        );
    }
    println!(
        "{} detections at threshold {}% -> {}",
        outcome.rendered.len(),
        cfg.threshold_percent,
        written.display()
    );
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{stem}_detected.png"))
}
