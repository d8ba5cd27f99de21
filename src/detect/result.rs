/// Axis-aligned box in pixel space of the image it was detected on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from a center point and size (the YOLO output layout).
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let union = self.area() + other.area() - self.intersection(other);
        if union <= 0.0 {
            0.0
        } else {
            self.intersection(other) / union
        }
    }

    /// Clamp into `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// One model output: a labeled, confidence-scored box.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Index into the model's label table.
    pub class_id: usize,
    pub label: String,
    /// Score in `0.0..=1.0`.
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, class_id: usize, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            bbox,
            class_id,
            label: label.into(),
            confidence,
        }
    }

    /// Inclusive cutoff: a detection exactly at the cutoff is kept.
    pub fn passes(&self, cutoff: f32) -> bool {
        self.confidence >= cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.intersection(&b), 0.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn from_center_and_clamp() {
        let b = BoundingBox::from_center(5.0, 5.0, 20.0, 4.0).clamp_to(8, 8);
        assert_eq!(b, BoundingBox::new(0.0, 3.0, 8.0, 7.0));
    }

    #[test]
    fn cutoff_is_inclusive() {
        let d = Detection::new("dog", 16, 0.5, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!(d.passes(0.5));
        assert!(!d.passes(0.51));
    }
}
