//! Camera frame source.
//!
//! This module provides `CameraSource` for live capture. It is responsible for:
//! - Opening a local capture device (e.g., /dev/video0, or index `0`)
//! - Negotiating a pixel format and normalizing frames to RGB
//! - Reporting open failures as `CaptureError::DeviceUnavailable`
//! - Reporting read failures as `CaptureError::FrameRead`
//! - Releasing the device when the session ends
//!
//! `stub://` devices produce synthetic frames and never touch hardware. The
//! stub accepts query flags so tests can exercise failure paths:
//! `stub://cam?fail_after=3` fails the fourth read, `stub://cam?unavailable`
//! refuses to open.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::time::{Duration, Instant};

use super::{CaptureError, FrameSource};
use crate::frame::Frame;

#[cfg(feature = "ingest-v4l2")]
use super::normalize::{normalize_to_rgb, PixelFormat};
#[cfg(feature = "ingest-v4l2")]
use ouroboros::self_referencing;

pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0"), bare index ("0"), or "stub://name".
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Requested frame rate. Zero leaves the device default.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Live capture source.
pub struct CameraSource {
    device: String,
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCamera),
    #[cfg(not(feature = "ingest-v4l2"))]
    Unsupported,
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        let device = resolve_device(&config.device)?;
        let config = CameraConfig {
            device: device.clone(),
            ..config
        };
        let backend = if device.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCamera::new(config)?)
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                CameraBackend::Device(DeviceCamera::new(config))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                CameraBackend::Unsupported
            }
        };
        Ok(Self { device, backend })
    }

    /// Get frame statistics.
    pub fn stats(&self) -> CameraStats {
        let frames_captured = match &self.backend {
            CameraBackend::Synthetic(camera) => camera.frame_count,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.frame_count,
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported => 0,
        };
        CameraStats {
            frames_captured,
            device: self.device.clone(),
        }
    }
}

impl FrameSource for CameraSource {
    fn name(&self) -> &str {
        &self.device
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.connect(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported => Err(CaptureError::device_unavailable(
                &self.device,
                "built without the ingest-v4l2 feature",
            )
            .into()),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.next_frame().map(Some),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.next_frame().map(Some),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported => {
                Err(CaptureError::frame_read(&self.device, "device not connected").into())
            }
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.release(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.release(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported => {}
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.connected,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.is_healthy(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported => false,
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

/// Map a bare device index to its device node.
pub fn resolve_device(device: &str) -> Result<String> {
    let device = device.trim();
    if device.is_empty() {
        return Err(anyhow!("camera device must not be empty"));
    }
    if device.chars().all(|c| c.is_ascii_digit()) {
        return Ok(format!("/dev/video{device}"));
    }
    if device.contains("://") && !device.starts_with("stub://") {
        return Err(anyhow!(
            "camera capture only supports local devices (no URL schemes)"
        ));
    }
    Ok(device.to_string())
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    connected: bool,
    frame_count: u64,
    fail_after: Option<u64>,
    unavailable: bool,
    frame_interval: Duration,
    last_frame_at: Option<Instant>,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Result<Self> {
        let mut fail_after = None;
        let mut unavailable = false;
        if let Some((_, query)) = config.device.split_once('?') {
            for flag in query.split('&').filter(|flag| !flag.is_empty()) {
                match flag.split_once('=') {
                    Some(("fail_after", value)) => {
                        fail_after = Some(value.parse().map_err(|_| {
                            anyhow!("stub camera fail_after must be an integer, got {value}")
                        })?);
                    }
                    None if flag == "unavailable" => unavailable = true,
                    _ => return Err(anyhow!("unknown stub camera flag: {flag}")),
                }
            }
        }
        let frame_interval = if config.target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(1000 / config.target_fps as u64)
        };
        Ok(Self {
            config,
            connected: false,
            frame_count: 0,
            fail_after,
            unavailable,
            frame_interval,
            last_frame_at: None,
        })
    }

    fn connect(&mut self) -> Result<()> {
        if self.unavailable {
            return Err(
                CaptureError::device_unavailable(&self.config.device, "device refused to open")
                    .into(),
            );
        }
        self.connected = true;
        log::info!(
            "CameraSource: connected to {} (synthetic {}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(CaptureError::frame_read(&self.config.device, "device not connected").into());
        }
        if self.fail_after.is_some_and(|limit| self.frame_count >= limit) {
            return Err(CaptureError::frame_read(&self.config.device, "synthetic read failure").into());
        }

        // Pace like a real device so the UI sees a steady stream.
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
        self.frame_count += 1;

        Ok(Frame::new(self.render(), self.frame_count))
    }

    /// Gradient background with a bright square sweeping left to right.
    fn render(&self) -> RgbImage {
        let width = self.config.width.max(1);
        let height = self.config.height.max(1);
        let side = (width.min(height) / 4).max(1);
        let travel = width.saturating_sub(side).max(1) as u64;
        let left = ((self.frame_count * 8) % travel) as u32;
        let top = (height - side.min(height)) / 2;

        RgbImage::from_fn(width, height, |x, y| {
            if x >= left && x < left + side && y >= top && y < top + side {
                Rgb([240, 240, 240])
            } else {
                Rgb([
                    (x * 255 / width) as u8,
                    (y * 255 / height) as u8,
                    (self.frame_count % 256) as u8,
                ])
            }
        })
    }

    fn release(&mut self) {
        if self.connected {
            log::info!("CameraSource: released {}", self.config.device);
        }
        self.connected = false;
    }
}

// ----------------------------------------------------------------------------
// Production V4L2 source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceCamera {
    config: CameraConfig,
    state: Option<DeviceState>,
    pixel_format: PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

#[cfg(feature = "ingest-v4l2")]
#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            pixel_format: PixelFormat::Yuyv,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device_path = self.config.device.clone();
        let unavailable =
            |reason: String| -> anyhow::Error { CaptureError::device_unavailable(&device_path, reason).into() };

        let mut device =
            v4l::Device::with_path(&self.config.device).map_err(|e| unavailable(e.to_string()))?;
        let mut format = device.format().map_err(|e| unavailable(e.to_string()))?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"MJPG");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device.format().map_err(|e| unavailable(e.to_string()))?
            }
        };

        self.pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr)
            .ok_or_else(|| unavailable(format!("unsupported pixel format {}", format.fourcc)))?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            unavailable(err.to_string())
        })?;
        self.state = Some(state);

        log::info!(
            "CameraSource: connected to {} ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.pixel_format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let device = self.config.device.clone();
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| CaptureError::frame_read(&device, "device not connected"))?;
        let pixels = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                CaptureError::frame_read(&device, &err)
            })?;

        let image = normalize_to_rgb(
            &pixels,
            self.active_width,
            self.active_height,
            self.pixel_format,
        )
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            CaptureError::frame_read(&device, &err)
        })?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Frame::new(image, self.frame_count))
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("CameraSource: released {}", self.config.device);
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(device: &str) -> CameraConfig {
        CameraConfig {
            device: device.to_string(),
            width: 320,
            height: 240,
            target_fps: 0,
        }
    }

    #[test]
    fn stub_camera_produces_ordered_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://test"))?;
        source.connect()?;

        let first = source.next_frame()?.expect("frame");
        let second = source.next_frame()?.expect("frame");
        assert_eq!((first.width(), first.height()), (320, 240));
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_ne!(first.image().as_raw(), second.image().as_raw());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn stub_camera_fails_read_after_limit() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://test?fail_after=1"))?;
        source.connect()?;
        source.next_frame()?;

        let err = source.next_frame().unwrap_err();
        assert!(matches!(
            CaptureError::find(&err),
            Some(CaptureError::FrameRead { .. })
        ));
        Ok(())
    }

    #[test]
    fn unavailable_stub_reports_device_unavailable() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://test?unavailable"))?;
        let err = source.connect().unwrap_err();
        assert!(CaptureError::is_device_unavailable(&err));
        assert!(!source.is_healthy());
        Ok(())
    }

    #[test]
    fn missing_device_reports_device_unavailable() -> Result<()> {
        let mut source = CameraSource::new(stub_config("/dev/video-does-not-exist"))?;
        let err = source.connect().unwrap_err();
        assert!(CaptureError::is_device_unavailable(&err));
        Ok(())
    }

    #[test]
    fn release_disconnects_stub() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://test"))?;
        source.connect()?;
        source.release();
        source.release();
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn bare_index_resolves_to_device_node() -> Result<()> {
        assert_eq!(resolve_device("0")?, "/dev/video0");
        assert_eq!(resolve_device(" 2 ")?, "/dev/video2");
        assert_eq!(resolve_device("stub://x")?, "stub://x");
        assert!(resolve_device("rtsp://cam").is_err());
        assert!(resolve_device("").is_err());
        Ok(())
    }

    #[test]
    fn unknown_stub_flag_is_rejected() {
        assert!(CameraSource::new(stub_config("stub://test?explode")).is_err());
    }
}
