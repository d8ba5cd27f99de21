//! live_detect - desktop object detection
//!
//! Loads the detector once, then opens the control panel: launch the camera,
//! upload an image, pick the person color and adjust the confidence threshold.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use live_detect::pipeline::DetectionContext;
use live_detect::shell::LiveDetectApp;
use live_detect::{AppConfig, ConfigOverrides};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Capture device: index, /dev/videoN, or stub://name.
    #[arg(long, env = "LIVE_DETECT_CAMERA")]
    device: Option<String>,
    /// ONNX model file.
    #[arg(long, env = "LIVE_DETECT_MODEL")]
    model: Option<PathBuf>,
    /// Labels file, one class name per line.
    #[arg(long, env = "LIVE_DETECT_LABELS")]
    labels: Option<PathBuf>,
    /// Detector backend (tract|stub).
    #[arg(long)]
    backend: Option<String>,
    /// Initial confidence threshold in percent (0-100).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: Option<u8>,
    /// Color assignment (random|hashed|seeded:<n>).
    #[arg(long)]
    color_mode: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = AppConfig::load()?;
    cfg.apply_overrides(&ConfigOverrides {
        model_path: args.model,
        labels_path: args.labels,
        backend: args.backend,
        device: args.device,
        threshold_percent: args.threshold,
        color_mode: args.color_mode,
        ..ConfigOverrides::default()
    })?;

    log::info!(
        "live_detect: loading {} backend ({})",
        cfg.detector.backend.as_str(),
        cfg.detector.model_path.display()
    );
    let context = DetectionContext::from_config(&cfg)?;
    log::info!(
        "live_detect: ready with {} classes; camera {}",
        context.backend.labels().len(),
        cfg.camera.device
    );

    LiveDetectApp::new(cfg, context).run()?;
    log::info!("live_detect: exited");
    Ok(())
}
