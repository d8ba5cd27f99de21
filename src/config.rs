use anyhow::{anyhow, Result};
use image::Rgb;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::annotate::{ColorMode, DEFAULT_PERSON_COLOR};
use crate::detect::BackendKind;
use crate::ingest::CameraConfig;

const DEFAULT_MODEL_PATH: &str = "yolov8s.onnx";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_DISPLAY_MAX: u32 = 800;
const DEFAULT_THRESHOLD_PERCENT: u8 = 50;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    backend: Option<String>,
    model_input: Option<u32>,
    min_confidence: Option<f32>,
    iou_threshold: Option<f32>,
    camera: Option<CameraConfigFile>,
    display: Option<DisplayConfigFile>,
    threshold_percent: Option<u8>,
    person_color: Option<[u8; 3]>,
    color_mode: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    max_width: Option<u32>,
    max_height: Option<u32>,
}

/// Everything needed to open a detector backend.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: BackendKind,
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    /// Square model input side in pixels.
    pub input_size: u32,
    pub min_confidence: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: None,
            input_size: DEFAULT_MODEL_INPUT,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

/// Bounds for displayed images; frames larger than this are scaled down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_DISPLAY_MAX,
            max_height: DEFAULT_DISPLAY_MAX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub detector: DetectorSettings,
    pub camera: CameraConfig,
    pub display: DisplaySettings,
    /// Initial slider position, 0..=100.
    pub threshold_percent: u8,
    pub person_color: Rgb<u8>,
    pub color_mode: ColorMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            detector: DetectorSettings::default(),
            camera: CameraConfig::default(),
            display: DisplaySettings::default(),
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            person_color: DEFAULT_PERSON_COLOR,
            color_mode: ColorMode::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVE_DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let backend = match file.backend.as_deref() {
            Some(name) => name.parse()?,
            None => defaults.detector.backend,
        };
        let detector = DetectorSettings {
            backend,
            model_path: file.model_path.unwrap_or(defaults.detector.model_path),
            labels_path: file.labels_path,
            input_size: file.model_input.unwrap_or(defaults.detector.input_size),
            min_confidence: file
                .min_confidence
                .unwrap_or(defaults.detector.min_confidence),
            iou_threshold: file
                .iou_threshold
                .unwrap_or(defaults.detector.iou_threshold),
        };

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            device: camera_file.device.unwrap_or(defaults.camera.device),
            width: camera_file.width.unwrap_or(defaults.camera.width),
            height: camera_file.height.unwrap_or(defaults.camera.height),
            target_fps: camera_file.target_fps.unwrap_or(defaults.camera.target_fps),
        };

        let display_file = file.display.unwrap_or_default();
        let display = DisplaySettings {
            max_width: display_file.max_width.unwrap_or(defaults.display.max_width),
            max_height: display_file
                .max_height
                .unwrap_or(defaults.display.max_height),
        };

        let color_mode = match file.color_mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => defaults.color_mode,
        };

        Ok(Self {
            detector,
            camera,
            display,
            threshold_percent: file
                .threshold_percent
                .unwrap_or(defaults.threshold_percent),
            person_color: file.person_color.map(Rgb).unwrap_or(defaults.person_color),
            color_mode,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("LIVE_DETECT_MODEL") {
            if !path.trim().is_empty() {
                self.detector.model_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("LIVE_DETECT_LABELS") {
            if !path.trim().is_empty() {
                self.detector.labels_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(backend) = std::env::var("LIVE_DETECT_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.parse()?;
            }
        }
        if let Ok(device) = std::env::var("LIVE_DETECT_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.device = device.trim().to_string();
            }
        }
        if let Ok(threshold) = std::env::var("LIVE_DETECT_THRESHOLD") {
            self.threshold_percent = threshold.trim().parse().map_err(|_| {
                anyhow!("LIVE_DETECT_THRESHOLD must be an integer percent between 0 and 100")
            })?;
        }
        if let Ok(mode) = std::env::var("LIVE_DETECT_COLOR_MODE") {
            if !mode.trim().is_empty() {
                self.color_mode = mode.parse()?;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.threshold_percent > 100 {
            return Err(anyhow!(
                "threshold_percent must be between 0 and 100, got {}",
                self.threshold_percent
            ));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("model_input must be greater than zero"));
        }
        if self.display.max_width == 0 || self.display.max_height == 0 {
            return Err(anyhow!("display bounds must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be greater than zero"));
        }
        for (name, value) in [
            ("min_confidence", self.detector.min_confidence),
            ("iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within 0.0..=1.0, got {}", name, value));
            }
        }
        self.camera.device = crate::ingest::camera::resolve_device(&self.camera.device)?;
        Ok(())
    }
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub backend: Option<String>,
    pub device: Option<String>,
    pub threshold_percent: Option<u8>,
    pub color_mode: Option<String>,
    pub person_color: Option<String>,
}

impl AppConfig {
    /// Apply command-line overrides, then re-validate.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(path) = &overrides.model_path {
            self.detector.model_path = path.clone();
        }
        if let Some(path) = &overrides.labels_path {
            self.detector.labels_path = Some(path.clone());
        }
        if let Some(backend) = &overrides.backend {
            self.detector.backend = backend.parse()?;
        }
        if let Some(device) = &overrides.device {
            self.camera.device = device.clone();
        }
        if let Some(threshold) = overrides.threshold_percent {
            self.threshold_percent = threshold;
        }
        if let Some(mode) = &overrides.color_mode {
            self.color_mode = mode.parse()?;
        }
        if let Some(color) = &overrides.person_color {
            self.person_color = crate::annotate::parse_rgb(color)?;
        }
        self.validate()
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
