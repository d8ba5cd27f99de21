use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::default_labels;
use crate::detect::result::{BoundingBox, Detection};

/// What the stub reports for each call.
#[derive(Clone, Debug)]
pub enum StubScript {
    /// Same detections every call.
    Fixed(Vec<Detection>),
    /// One entry per call, repeating from the start when exhausted.
    Sequence(Vec<Vec<Detection>>),
    /// A person and a dog placed relative to the image size.
    Demo,
    /// Every call fails with this message.
    Fail(String),
}

/// Stub backend for tests and model-less demos.
pub struct StubBackend {
    script: StubScript,
    labels: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn new(script: StubScript) -> Self {
        Self {
            script,
            labels: default_labels(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fixed(detections: Vec<Detection>) -> Self {
        Self::new(StubScript::Fixed(detections))
    }

    pub fn demo() -> Self {
        Self::new(StubScript::Demo)
    }

    /// Shared call count; stays readable after the backend is boxed and moved.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    fn demo_detections(image: &RgbImage) -> Vec<Detection> {
        let (w, h) = (image.width() as f32, image.height() as f32);
        vec![
            Detection::new(
                "person",
                0,
                0.87,
                BoundingBox::new(w * 0.10, h * 0.15, w * 0.40, h * 0.95),
            ),
            Detection::new(
                "dog",
                16,
                0.64,
                BoundingBox::new(w * 0.55, h * 0.55, w * 0.85, h * 0.90),
            ),
            Detection::new(
                "cup",
                41,
                0.31,
                BoundingBox::new(w * 0.70, h * 0.10, w * 0.78, h * 0.22),
            ),
        ]
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(StubScript::Fixed(Vec::new()))
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            StubScript::Fixed(detections) => Ok(detections.clone()),
            StubScript::Sequence(frames) if frames.is_empty() => Ok(Vec::new()),
            StubScript::Sequence(frames) => Ok(frames[call % frames.len()].clone()),
            StubScript::Demo => Ok(Self::demo_detections(image)),
            StubScript::Fail(message) => Err(anyhow!("stub model failure: {}", message)),
        }
    }
}
