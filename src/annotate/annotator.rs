use std::collections::BTreeMap;

use ab_glyph::{FontRef, PxScale};
use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::colors::ColorPolicy;
use crate::detect::{BoundingBox, Detection};

static FONT_BYTES: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

const BOX_THICKNESS: u32 = 4;
const LABEL_GAP: i32 = 10;
const LABEL_SCALE: f32 = 28.0;
const HUD_SCALE: f32 = 56.0;
const HUD_CLASS_SCALE: f32 = 42.0;
const HUD_LEFT: i32 = 10;
const HUD_FIRST_BASELINE: i32 = 50;
const HUD_LINE_STEP: i32 = 50;

const HUD_FPS_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const HUD_COUNT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const HUD_CLASS_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Slider position (0..=100) as a confidence cutoff.
pub fn percent_to_cutoff(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0
}

/// A detection that survived the cutoff, with the color it was drawn in.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedBox {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub color: Rgb<u8>,
}

/// An annotated image and what was drawn on it.
#[derive(Clone, Debug)]
pub struct Annotated {
    pub image: RgbImage,
    pub boxes: Vec<RenderedBox>,
}

/// Text metrics drawn over live frames.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HudOverlay {
    pub fps: f32,
    /// Running total for the session.
    pub total_detections: u64,
    /// Per-class counts for the current frame.
    pub class_counts: BTreeMap<String, usize>,
}

impl HudOverlay {
    pub fn lines(&self) -> Vec<(String, Rgb<u8>)> {
        let mut lines = vec![
            (format!("FPS: {:.2}", self.fps), HUD_FPS_COLOR),
            (
                format!("Detections: {}", self.total_detections),
                HUD_COUNT_COLOR,
            ),
        ];
        for (label, count) in &self.class_counts {
            lines.push((format!("{}: {}", label, count), HUD_CLASS_COLOR));
        }
        lines
    }
}

/// Draws boxes, labels and the HUD onto RGB images.
pub struct Annotator {
    font: FontRef<'static>,
}

impl Annotator {
    pub fn new() -> Result<Self> {
        let font = FontRef::try_from_slice(FONT_BYTES)
            .map_err(|e| anyhow!("embedded label font is invalid: {}", e))?;
        Ok(Self { font })
    }

    /// Annotated copy of `image`; the input is left untouched.
    pub fn annotate(
        &self,
        image: &RgbImage,
        detections: &[Detection],
        cutoff: f32,
        colors: &mut ColorPolicy,
    ) -> Annotated {
        let mut image = image.clone();
        let boxes = self.annotate_in_place(&mut image, detections, cutoff, colors);
        Annotated { image, boxes }
    }

    /// Draw every detection whose confidence is at least `cutoff`.
    ///
    /// Colors come from `colors`, which assigns on first sight; the returned
    /// boxes are in draw order.
    pub fn annotate_in_place(
        &self,
        image: &mut RgbImage,
        detections: &[Detection],
        cutoff: f32,
        colors: &mut ColorPolicy,
    ) -> Vec<RenderedBox> {
        let mut rendered = Vec::new();
        for detection in detections.iter().filter(|d| d.passes(cutoff)) {
            let color = colors.color_for(&detection.label);
            let bbox = detection.bbox.clamp_to(image.width(), image.height());
            self.draw_box(image, &bbox, color);
            self.draw_label(image, &bbox, &detection.label, color);
            rendered.push(RenderedBox {
                label: detection.label.clone(),
                confidence: detection.confidence,
                bbox,
                color,
            });
        }
        rendered
    }

    pub fn draw_hud(&self, image: &mut RgbImage, hud: &HudOverlay) {
        let mut baseline = HUD_FIRST_BASELINE;
        for (index, (text, color)) in hud.lines().into_iter().enumerate() {
            let scale = if index < 2 { HUD_SCALE } else { HUD_CLASS_SCALE };
            self.draw_text_at_baseline(image, &text, color, PxScale::from(scale), HUD_LEFT, baseline);
            baseline += HUD_LINE_STEP;
        }
    }

    fn draw_box(&self, image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
        let x = bbox.x1.round() as i32;
        let y = bbox.y1.round() as i32;
        let width = bbox.width().round() as u32;
        let height = bbox.height().round() as u32;
        // Nested hollow rects, shrinking inward.
        for inset in 0..BOX_THICKNESS {
            let w = width.saturating_sub(inset * 2);
            let h = height.saturating_sub(inset * 2);
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(w, h);
            draw_hollow_rect_mut(image, rect, color);
        }
    }

    fn draw_label(&self, image: &mut RgbImage, bbox: &BoundingBox, label: &str, color: Rgb<u8>) {
        let baseline = bbox.y1.round() as i32 - LABEL_GAP;
        self.draw_text_at_baseline(
            image,
            label,
            color,
            PxScale::from(LABEL_SCALE),
            bbox.x1.round() as i32,
            baseline,
        );
    }

    fn draw_text_at_baseline(
        &self,
        image: &mut RgbImage,
        text: &str,
        color: Rgb<u8>,
        scale: PxScale,
        x: i32,
        baseline: i32,
    ) {
        let (_, text_h) = text_size(scale, &self.font, text);
        let top = (baseline - text_h as i32).max(0);
        draw_text_mut(image, color, x, top, scale, &self.font, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::colors::{ColorMode, DEFAULT_PERSON_COLOR};

    fn detection(label: &str, confidence: f32) -> Detection {
        Detection::new(label, 0, confidence, BoundingBox::new(60.0, 60.0, 120.0, 140.0))
    }

    #[test]
    fn cutoff_is_inclusive() -> Result<()> {
        let annotator = Annotator::new()?;
        let mut colors = ColorPolicy::new(ColorMode::Seeded(1), DEFAULT_PERSON_COLOR);
        let mut image = RgbImage::new(200, 200);
        let detections = vec![detection("dog", 0.49), detection("cat", 0.5), detection("cup", 0.9)];

        let rendered = annotator.annotate_in_place(&mut image, &detections, percent_to_cutoff(50), &mut colors);
        let labels: Vec<&str> = rendered.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["cat", "cup"]);
        assert!(rendered.iter().all(|r| r.confidence >= 0.5));
        Ok(())
    }

    #[test]
    fn box_edge_uses_resolved_color() -> Result<()> {
        let annotator = Annotator::new()?;
        let mut colors = ColorPolicy::new(ColorMode::Seeded(1), Rgb([255, 0, 0]));
        let mut image = RgbImage::new(200, 200);

        let rendered = annotator.annotate_in_place(&mut image, &[detection("person", 0.8)], 0.0, &mut colors);
        assert_eq!(rendered[0].color, Rgb([255, 0, 0]));
        // Left edge, below the label.
        assert_eq!(*image.get_pixel(61, 100), Rgb([255, 0, 0]));
        // Interior untouched.
        assert_eq!(*image.get_pixel(90, 100), Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn zero_cutoff_draws_on_a_copy() -> Result<()> {
        let annotator = Annotator::new()?;
        let mut colors = ColorPolicy::default();
        let image = RgbImage::new(200, 200);
        let annotated = annotator.annotate(&image, &[detection("dog", 0.0)], 0.0, &mut colors);
        assert_eq!(annotated.boxes.len(), 1);
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
        assert!(annotated.image.pixels().any(|p| *p != Rgb([0, 0, 0])));
        Ok(())
    }

    #[test]
    fn hud_lines_follow_counts() {
        let mut hud = HudOverlay {
            fps: 24.456,
            total_detections: 7,
            ..HudOverlay::default()
        };
        hud.class_counts.insert("person".to_string(), 2);
        hud.class_counts.insert("dog".to_string(), 1);

        let text: Vec<String> = hud.lines().into_iter().map(|(text, _)| text).collect();
        assert_eq!(text, vec!["FPS: 24.46", "Detections: 7", "dog: 1", "person: 2"]);
    }

    #[test]
    fn hud_draws_without_panicking_on_small_frames() -> Result<()> {
        let annotator = Annotator::new()?;
        let mut image = RgbImage::new(32, 32);
        let mut hud = HudOverlay::default();
        hud.class_counts.insert("person".to_string(), 1);
        annotator.draw_hud(&mut image, &hud);
        Ok(())
    }

    #[test]
    fn percent_maps_to_unit_range() {
        assert_eq!(percent_to_cutoff(0), 0.0);
        assert_eq!(percent_to_cutoff(50), 0.5);
        assert_eq!(percent_to_cutoff(100), 1.0);
        assert_eq!(percent_to_cutoff(200), 1.0);
    }
}
