//! Frame sources.
//!
//! This module provides the two places frames come from:
//! - A single still image on local disk (`ImageFileSource`)
//! - A capture device (`CameraSource`): V4L2 devices (feature: ingest-v4l2)
//!   or a synthetic `stub://` camera for tests and demos
//!
//! All sources produce `Frame` instances in capture order. A still image is a
//! one-frame sequence that can be rewound; a camera is a live sequence that
//! cannot.
//!
//! Sources report the two recognised capture failures through `CaptureError`:
//! - `DeviceUnavailable` when the device cannot be opened
//! - `FrameRead` when a read fails mid-stream
//!
//! Either failure ends the current session only. The application stays up.

pub mod camera;
mod error;
pub mod file;
#[cfg(feature = "ingest-v4l2")]
mod normalize;

pub use camera::{CameraConfig, CameraSource, CameraStats};
pub use error::CaptureError;
pub use file::ImageFileSource;

use anyhow::Result;

use crate::frame::Frame;

/// An ordered sequence of frames.
pub trait FrameSource: Send {
    /// Human-readable source identifier (device path or file path).
    fn name(&self) -> &str;

    /// Open the underlying device or file.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` once the sequence has ended.
    ///
    /// Camera sources block until a frame is available.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the device. Safe to call more than once.
    fn release(&mut self);

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}
