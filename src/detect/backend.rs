use anyhow::Result;
use image::RgbImage;
use std::time::{Duration, Instant};

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// A backend wraps one pretrained model. It receives a full RGB image and
/// returns every detection the model reports, already mapped back into the
/// image's pixel space and de-duplicated. Confidence filtering for display is
/// the annotator's job, not the backend's.
///
/// Calls are synchronous. A failure ends the operation that triggered it.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names, indexed by `Detection::class_id`.
    fn labels(&self) -> &[String];

    /// Run detection on an image.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Detections plus the time the model took to produce them.
#[derive(Clone, Debug)]
pub struct TimedDetections {
    pub detections: Vec<Detection>,
    pub inference: Duration,
}

impl TimedDetections {
    /// Frames per second implied by the inference latency alone.
    pub fn fps(&self) -> f32 {
        let ms = self.inference.as_secs_f32() * 1000.0;
        if ms > 0.0 {
            1000.0 / ms
        } else {
            0.0
        }
    }
}

/// Run a backend and measure its latency.
pub fn detect_timed(backend: &mut dyn DetectorBackend, image: &RgbImage) -> Result<TimedDetections> {
    let started = Instant::now();
    let detections = backend.detect(image)?;
    Ok(TimedDetections {
        detections,
        inference: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_is_inverse_of_latency() {
        let timed = TimedDetections {
            detections: vec![],
            inference: Duration::from_millis(40),
        };
        assert!((timed.fps() - 25.0).abs() < 0.01);
    }

    #[test]
    fn zero_latency_reports_zero_fps() {
        let timed = TimedDetections {
            detections: vec![],
            inference: Duration::ZERO,
        };
        assert_eq!(timed.fps(), 0.0);
    }
}
