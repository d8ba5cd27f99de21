//! Captured frames.
//!
//! - `Frame`: one decoded RGB image plus its position in the source sequence.
//!
//! Frames are ephemeral. Sources hand them to the pipeline, the detector reads
//! them, and the annotator draws on a copy. Nothing here is persisted.

use image::RgbImage;
use std::time::{Duration, Instant};

/// One decoded RGB image produced by a `FrameSource`.
pub struct Frame {
    image: RgbImage,

    /// 1-based position within the source (a still image is always frame 1).
    pub sequence: u64,

    /// Monotonic capture instant (for latency logging only).
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Time since the frame left the device.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_reports_image_dimensions() {
        let frame = Frame::new(RgbImage::new(64, 48), 3);
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.sequence, 3);
        assert_eq!(frame.into_image().dimensions(), (64, 48));
    }
}
