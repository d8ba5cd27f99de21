//! detect_camera - headless live detection session
//!
//! Runs the camera pipeline without a window:
//! 1. Opens the configured capture device (or a `stub://` camera)
//! 2. Detects and annotates frames until the frame limit, `p` + Enter, or Ctrl-C
//! 3. Prints the session statistics
//!
//! `r` + Enter pauses/resumes and `t` + Enter toggles overlays.

use anyhow::{anyhow, Result};
use clap::Parser;
use image::RgbImage;
use std::io::{BufRead, IsTerminal};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::mpsc;

use live_detect::annotate::save_image;
use live_detect::pipeline::{run_camera_session, DetectionContext, LiveSettings, WorkerControl, WorkerEvent};
use live_detect::session::key_to_command;
use live_detect::{AppConfig, CameraSource, ConfigOverrides};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Capture device: index, /dev/videoN, or stub://name.
    #[arg(long, env = "LIVE_DETECT_CAMERA")]
    device: Option<String>,
    /// Stop after this many processed frames.
    #[arg(long)]
    frames: Option<u64>,
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
    /// Save the last annotated frame here when the session ends.
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Ignore key commands on stdin.
    #[arg(long)]
    no_keys: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn overrides(args: &Args) -> ConfigOverrides {
    ConfigOverrides {
        model_path: args.model.clone(),
        labels_path: args.labels.clone(),
        backend: args.backend.clone(),
        device: args.device.clone(),
        threshold_percent: args.threshold,
        color_mode: args.color_mode.clone(),
        ..ConfigOverrides::default()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = AppConfig::load()?;
    cfg.apply_overrides(&overrides(&args))?;

    let mut context = {
        let _stage = ui.stage("Load detector");
        DetectionContext::from_config(&cfg)?
    };
    let mut source = CameraSource::new(cfg.camera.clone())?;

    let (control_tx, control_rx) = mpsc::channel();
    let ctrlc_tx = control_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(WorkerControl::Stop);
    })
    .expect("error setting Ctrl-C handler");

    if !args.no_keys {
        let keys_tx = control_tx.clone();
        std::thread::Builder::new()
            .name("stdin-keys".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    for command in line.chars().filter_map(key_to_command) {
                        if keys_tx.send(WorkerControl::Command(command)).is_err() {
                            return;
                        }
                    }
                }
            })?;
    }
    drop(control_tx);

    let progress = ui.frames(args.frames);
    let mut processed = 0u64;
    let mut last_frame: Option<RgbImage> = None;
    let mut sink = |event: WorkerEvent| {
        match event {
            WorkerEvent::Started { device } => log::info!("detect_camera: capturing from {}", device),
            WorkerEvent::Paused(paused) => {
                log::info!("detect_camera: {}", if paused { "paused" } else { "resumed" })
            }
            WorkerEvent::Frame(frame) => {
                processed += 1;
                if let Some(hud) = &frame.hud {
                    progress.tick(hud.fps, hud.total_detections);
                } else {
                    progress.tick(0.0, 0);
                }
                last_frame = Some(frame.image);
                if args.frames.is_some_and(|limit| processed >= limit) {
                    return ControlFlow::Break(());
                }
            }
            WorkerEvent::Finished => {}
        }
        ControlFlow::Continue(())
    };

    log::info!("detect_camera: press p+Enter or Ctrl-C to stop (r pause, t overlays)");
    let report = run_camera_session(
        &mut context,
        &mut source,
        &LiveSettings::from_config(&cfg),
        &control_rx,
        &mut sink,
    )?;
    progress.finish();
    let stats = source.stats();
    log::info!(
        "detect_camera: {} frames captured from {}, {} processed",
        stats.frames_captured,
        stats.device,
        processed
    );

    print!("{}", report.summary);

    if let Some(path) = &args.snapshot {
        match &last_frame {
            Some(image) => {
                let written = save_image(image, path)?;
                println!("snapshot written to {}", written.display());
            }
            None => log::warn!("detect_camera: no frame captured; snapshot skipped"),
        }
    }

    match report.error {
        Some(err) => Err(anyhow!("camera session ended early: {:#}", err)),
        None => Ok(()),
    }
}
