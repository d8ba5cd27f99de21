use std::str::FromStr;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::{StubBackend, StubScript};
use super::labels::labels_or_default;
use crate::config::DetectorSettings;

/// Backends selectable from configuration.
///
/// `Tract` is the default in every build; without the backend-tract
/// feature opening it fails instead of drawing demo detections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// YOLOv8 ONNX model through tract (feature: backend-tract).
    #[default]
    Tract,
    /// Scripted demo detections; only used when asked for by name.
    Stub,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Tract => "tract",
            BackendKind::Stub => "stub",
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tract" | "onnx" => Ok(BackendKind::Tract),
            "stub" | "demo" => Ok(BackendKind::Stub),
            other => Err(anyhow!("unknown detector backend '{}' (expected tract|stub)", other)),
        }
    }
}

/// Load the configured backend. Called once at startup.
pub fn open_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend {
        BackendKind::Stub => {
            log::warn!("detector: using stub backend; detections are scripted, not inferred");
            Ok(Box::new(StubBackend::new(StubScript::Demo)))
        }
        BackendKind::Tract => open_tract(settings),
    }
}

#[cfg(feature = "backend-tract")]
fn open_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    use super::backends::TractBackend;

    let labels = labels_or_default(settings.labels_path.as_deref())?;
    let mut backend = TractBackend::new(&settings.model_path, settings.input_size, labels)?
        .with_min_confidence(settings.min_confidence)
        .with_iou_threshold(settings.iou_threshold);
    backend.warm_up()?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn open_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    labels_or_default(settings.labels_path.as_deref())?;
    Err(anyhow!(
        "model {} needs the backend-tract feature; rebuild with --features backend-tract or use backend=stub",
        settings.model_path.display()
    ))
}
