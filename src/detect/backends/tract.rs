#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{decode_yolov8, non_max_suppression, Letterbox};
use crate::detect::result::Detection;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// This backend loads a local model file once and runs it on letterboxed RGB
/// frames. It does not perform any network I/O.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    labels: Vec<String>,
    side: u32,
    min_confidence: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for `side x side` input.
    pub fn new<P: AsRef<Path>>(model_path: P, side: u32, labels: Vec<String>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side as usize, side as usize)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} input, {} labels)",
            model_path.display(),
            side,
            side,
            labels.len()
        );

        Ok(Self {
            model,
            labels,
            side,
            min_confidence: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the score floor below which candidates are discarded.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Override the non-max suppression overlap threshold.
    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }

    fn build_input(&self, canvas: &RgbImage) -> Tensor {
        let side = self.side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        });
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let letterbox = Letterbox::new(image.width(), image.height(), self.side);
        let input = self.build_input(&letterbox.apply(image));
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let values: Vec<f32> = view.iter().copied().collect();

        let candidates = decode_yolov8(&values, view.shape(), &self.labels, self.min_confidence)?;
        let detections = non_max_suppression(candidates, self.iou_threshold)
            .into_iter()
            .map(|mut detection| {
                detection.bbox = letterbox
                    .unmap(&detection.bbox)
                    .clamp_to(image.width(), image.height());
                detection
            })
            .collect();
        Ok(detections)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.side, self.side);
        self.detect(&blank).map(|_| ())
    }
}
