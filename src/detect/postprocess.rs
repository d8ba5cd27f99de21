//! YOLOv8 pre/post-processing.
//!
//! Images are letterboxed into the square model input. The raw output tensor
//! (`[1, 4 + classes, anchors]`, or its transpose) is decoded into
//! detections, filtered by a confidence floor, de-duplicated per class with
//! non-max suppression, and mapped back to source pixels.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::detect::result::{BoundingBox, Detection};

/// Padding gray used by the Ultralytics exporters.
const PAD_GRAY: u8 = 114;

/// Scale and padding used to fit a source image into the model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub side: u32,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    resized_w: u32,
    resized_h: u32,
}

impl Letterbox {
    pub fn new(src_width: u32, src_height: u32, side: u32) -> Self {
        let scale = (side as f32 / src_width.max(1) as f32).min(side as f32 / src_height.max(1) as f32);
        let resized_w = ((src_width as f32 * scale).round() as u32).clamp(1, side);
        let resized_h = ((src_height as f32 * scale).round() as u32).clamp(1, side);
        Self {
            side,
            scale,
            pad_x: (side - resized_w) as f32 / 2.0,
            pad_y: (side - resized_h) as f32 / 2.0,
            resized_w,
            resized_h,
        }
    }

    /// Resize `image` into a padded `side x side` canvas.
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let resized = imageops::resize(image, self.resized_w, self.resized_h, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(self.side, self.side, Rgb([PAD_GRAY; 3]));
        imageops::overlay(
            &mut canvas,
            &resized,
            self.pad_x.floor() as i64,
            self.pad_y.floor() as i64,
        );
        canvas
    }

    /// Map a box from model-input space back to source pixels.
    pub fn unmap(&self, bbox: &BoundingBox) -> BoundingBox {
        let pad_x = self.pad_x.floor();
        let pad_y = self.pad_y.floor();
        BoundingBox {
            x1: (bbox.x1 - pad_x) / self.scale,
            y1: (bbox.y1 - pad_y) / self.scale,
            x2: (bbox.x2 - pad_x) / self.scale,
            y2: (bbox.y2 - pad_y) / self.scale,
        }
    }
}

/// Decode a YOLOv8 detection head.
///
/// Accepts `[1, 4 + C, N]` (exporter default) or `[1, N, 4 + C]`. Boxes stay
/// in model-input space; only the best class per anchor is reported.
pub fn decode_yolov8(
    output: &[f32],
    shape: &[usize],
    labels: &[String],
    min_confidence: f32,
) -> Result<Vec<Detection>> {
    let (rows, cols) = match shape {
        [1, a, b] | [a, b] => (*a, *b),
        _ => return Err(anyhow!("unexpected YOLO output shape {:?}", shape)),
    };
    if output.len() != rows * cols {
        return Err(anyhow!(
            "YOLO output holds {} values, shape {:?} needs {}",
            output.len(),
            shape,
            rows * cols
        ));
    }

    // The axis sized 4 + labels holds the attributes. Failing that, an axis
    // too short for a box plus one score holds the anchors; else the smaller
    // axis holds the attributes.
    let expected = labels.len() + 4;
    let channels_first = match (rows == expected, cols == expected) {
        (true, false) => true,
        (false, true) => false,
        _ if rows > 4 && cols <= 4 => true,
        _ if cols > 4 && rows <= 4 => false,
        _ => rows <= cols,
    };
    let (attributes, anchors) = if channels_first { (rows, cols) } else { (cols, rows) };
    if attributes <= 4 {
        return Err(anyhow!("YOLO output has no class scores (shape {:?})", shape));
    }
    let classes = attributes - 4;
    let at = |attr: usize, anchor: usize| -> f32 {
        if channels_first {
            output[attr * anchors + anchor]
        } else {
            output[anchor * attributes + attr]
        }
    };

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..classes {
            let score = at(4 + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score < min_confidence {
            continue;
        }
        let bbox = BoundingBox::from_center(at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        let label = labels
            .get(best_class)
            .cloned()
            .unwrap_or_else(|| format!("class{best_class}"));
        detections.push(Detection::new(label, best_class, best_score.min(1.0), bbox));
    }
    Ok(detections)
}

/// Class-aware non-max suppression. Output is ordered by confidence.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept.iter().any(|existing| {
            existing.class_id == candidate.class_id
                && existing.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["person".to_string(), "dog".to_string()]
    }

    #[test]
    fn letterbox_round_trips_box_coordinates() {
        let letterbox = Letterbox::new(1280, 720, 640);
        assert_eq!(letterbox.scale, 0.5);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 140.0);

        let model_box = BoundingBox::new(100.0, 190.0, 200.0, 290.0);
        assert_eq!(letterbox.unmap(&model_box), BoundingBox::new(200.0, 100.0, 400.0, 300.0));
    }

    #[test]
    fn letterbox_canvas_is_square_and_padded() {
        let image = RgbImage::from_pixel(40, 20, Rgb([255, 0, 0]));
        let letterbox = Letterbox::new(40, 20, 32);
        let canvas = letterbox.apply(&image);
        assert_eq!(canvas.dimensions(), (32, 32));
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([PAD_GRAY; 3]));
        assert_eq!(canvas.get_pixel(16, 16), &Rgb([255, 0, 0]));
    }

    #[test]
    fn decodes_channels_first_output() -> Result<()> {
        // Attributes (cx, cy, w, h, person, dog) by row, one column per anchor.
        let anchors = 8;
        let mut output = vec![0.0f32; 6 * anchors];
        let mut set = |attr: usize, anchor: usize, value: f32| output[attr * anchors + anchor] = value;
        for (attr, value) in [(0, 50.0), (1, 50.0), (2, 20.0), (3, 20.0), (4, 0.9), (5, 0.05)] {
            set(attr, 0, value);
        }
        for (attr, value) in [(0, 10.0), (1, 10.0), (2, 4.0), (3, 4.0), (4, 0.1), (5, 0.3)] {
            set(attr, 1, value);
        }
        for (attr, value) in [(0, 30.0), (1, 30.0), (2, 10.0), (3, 10.0), (4, 0.2), (5, 0.7)] {
            set(attr, 2, value);
        }
        let detections = decode_yolov8(&output, &[1, 6, anchors], &labels(), 0.25)?;

        assert_eq!(detections.len(), 3);
        assert_eq!(detections[0].label, "person");
        assert_eq!(detections[0].bbox, BoundingBox::new(40.0, 40.0, 60.0, 60.0));
        assert_eq!(detections[1].label, "dog");
        assert!((detections[1].confidence - 0.3).abs() < 1e-6);
        assert_eq!(detections[2].label, "dog");
        assert!((detections[2].confidence - 0.7).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn decodes_transposed_output() -> Result<()> {
        let output = vec![
            10.0, 10.0, 4.0, 4.0, 0.1, 0.8, //
            30.0, 30.0, 4.0, 4.0, 0.1, 0.1, //
            50.0, 50.0, 4.0, 4.0, 0.6, 0.2, //
            70.0, 70.0, 4.0, 4.0, 0.0, 0.0, //
            90.0, 90.0, 4.0, 4.0, 0.0, 0.0, //
            99.0, 99.0, 4.0, 4.0, 0.0, 0.0, //
            11.0, 11.0, 4.0, 4.0, 0.0, 0.0, //
        ];
        let detections = decode_yolov8(&output, &[1, 7, 6], &labels(), 0.5)?;
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "dog");
        assert_eq!(detections[1].label, "person");
        Ok(())
    }

    #[test]
    fn rejects_mismatched_shape() {
        assert!(decode_yolov8(&[0.0; 10], &[1, 6, 3], &labels(), 0.25).is_err());
        assert!(decode_yolov8(&[0.0; 12], &[1, 4, 3], &labels(), 0.25).is_err());
    }

    #[test]
    fn few_anchors_use_label_count_to_pick_layout() -> Result<()> {
        // Three anchors by (cx, cy, w, h, person, dog): fewer anchors than attributes.
        let output = vec![
            10.0, 10.0, 4.0, 4.0, 0.1, 0.8, //
            30.0, 30.0, 4.0, 4.0, 0.9, 0.1, //
            50.0, 50.0, 4.0, 4.0, 0.0, 0.0, //
        ];
        let detections = decode_yolov8(&output, &[1, 3, 6], &labels(), 0.5)?;
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "dog");
        assert_eq!(detections[0].bbox, BoundingBox::new(8.0, 8.0, 12.0, 12.0));
        assert_eq!(detections[1].label, "person");

        let channels_first: Vec<f32> = (0..6)
            .flat_map(|attr| (0..3).map(move |anchor| (attr, anchor)))
            .map(|(attr, anchor)| output[anchor * 6 + attr])
            .collect();
        let detections = decode_yolov8(&channels_first, &[1, 6, 3], &labels(), 0.5)?;
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1].bbox, BoundingBox::new(28.0, 28.0, 32.0, 32.0));
        Ok(())
    }

    #[test]
    fn unknown_class_index_gets_placeholder_label() -> Result<()> {
        let output = vec![5.0, 5.0, 2.0, 2.0, 0.0, 0.0, 0.9];
        let detections = decode_yolov8(&output, &[1, 7, 1], &labels(), 0.25)?;
        assert_eq!(detections[0].label, "class2");
        Ok(())
    }

    #[test]
    fn nms_keeps_best_box_per_class() {
        let person = |conf: f32, x: f32| {
            Detection::new("person", 0, conf, BoundingBox::new(x, 0.0, x + 10.0, 10.0))
        };
        let dog = Detection::new("dog", 1, 0.4, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let kept = non_max_suppression(
            vec![person(0.6, 1.0), person(0.9, 0.0), dog.clone(), person(0.5, 50.0)],
            0.45,
        );
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.5);
        assert_eq!(kept[2], dog);
    }
}
