use std::fmt;

use image::Rgb;

use crate::ingest::CaptureError;
use crate::session::SessionSummary;

/// What the shell is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Idle,
    LaunchingCamera,
    CameraRunning { paused: bool, overlay_visible: bool },
    ProcessingImage,
    ImageDisplayed,
    Exiting,
}

/// Status bar text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Ready,
    LaunchingCamera,
    CameraRunning,
    Paused,
    UploadingImage,
    PickingColor,
    Exiting,
    Message(String),
    Error(String),
}

impl Status {
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ready => write!(f, "Ready"),
            Status::LaunchingCamera => write!(f, "Launching Camera..."),
            Status::CameraRunning => write!(f, "Camera running (P exit, R pause, T overlays)"),
            Status::Paused => write!(f, "Paused (R to resume)"),
            Status::UploadingImage => write!(f, "Uploading Image..."),
            Status::PickingColor => write!(f, "Picking Color..."),
            Status::Exiting => write!(f, "Exiting..."),
            Status::Message(text) => write!(f, "{}", text),
            Status::Error(text) => write!(f, "Error: {}", text),
        }
    }
}

/// Toolkit-independent shell state.
///
/// Every button and worker event goes through one of these transitions; the
/// eframe app only renders what is here.
#[derive(Clone, Debug)]
pub struct ShellModel {
    mode: Mode,
    status: Status,
    threshold_percent: u8,
    person_color: Rgb<u8>,
    picking_color: bool,
    summary: Option<SessionSummary>,
}

impl ShellModel {
    pub fn new(threshold_percent: u8, person_color: Rgb<u8>) -> Self {
        Self {
            mode: Mode::Idle,
            status: Status::Ready,
            threshold_percent: threshold_percent.min(100),
            person_color,
            picking_color: false,
            summary: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn threshold_percent(&self) -> u8 {
        self.threshold_percent
    }

    pub fn person_color(&self) -> Rgb<u8> {
        self.person_color
    }

    pub fn is_picking_color(&self) -> bool {
        self.picking_color
    }

    pub fn camera_active(&self) -> bool {
        matches!(
            self.mode,
            Mode::LaunchingCamera | Mode::CameraRunning { .. }
        )
    }

    /// Camera and upload buttons are only live when nothing else runs.
    pub fn can_start_work(&self) -> bool {
        matches!(self.mode, Mode::Idle | Mode::ImageDisplayed)
    }

    pub fn set_threshold(&mut self, percent: u8) -> u8 {
        self.threshold_percent = percent.min(100);
        self.threshold_percent
    }

    pub fn request_camera(&mut self) -> bool {
        if !self.can_start_work() {
            return false;
        }
        self.mode = Mode::LaunchingCamera;
        self.status = Status::LaunchingCamera;
        true
    }

    pub fn camera_started(&mut self, device: &str) {
        self.mode = Mode::CameraRunning {
            paused: false,
            overlay_visible: true,
        };
        self.status = Status::Message(format!("Camera running on {}", device));
    }

    pub fn camera_paused(&mut self, paused: bool) {
        if let Mode::CameraRunning { overlay_visible, .. } = self.mode {
            self.mode = Mode::CameraRunning {
                paused,
                overlay_visible,
            };
            self.status = if paused {
                Status::Paused
            } else {
                Status::CameraRunning
            };
        }
    }

    pub fn overlay_toggled(&mut self) {
        if let Mode::CameraRunning {
            paused,
            overlay_visible,
        } = self.mode
        {
            self.mode = Mode::CameraRunning {
                paused,
                overlay_visible: !overlay_visible,
            };
        }
    }

    /// Session could not start; back to idle with the reason.
    pub fn camera_failed(&mut self, err: &anyhow::Error) {
        self.mode = Mode::Idle;
        self.status = match CaptureError::find(err) {
            Some(CaptureError::DeviceUnavailable { device, .. }) => {
                Status::Error(format!("Could not open camera {}", device))
            }
            _ => Status::Error(format!("{:#}", err)),
        };
    }

    /// Session ended (exit key, end of stream or mid-stream failure).
    pub fn camera_finished(&mut self, summary: SessionSummary, error: Option<&anyhow::Error>) {
        self.mode = Mode::Idle;
        self.summary = Some(summary);
        self.status = match error {
            Some(err) => Status::Error(format!("Camera session ended: {:#}", err)),
            None => Status::Ready,
        };
    }

    pub fn request_upload(&mut self) -> bool {
        if !self.can_start_work() {
            return false;
        }
        self.status = Status::UploadingImage;
        true
    }

    pub fn upload_cancelled(&mut self) {
        if self.status == Status::UploadingImage {
            self.status = Status::Ready;
        }
    }

    pub fn upload_started(&mut self) {
        self.mode = Mode::ProcessingImage;
        self.status = Status::UploadingImage;
    }

    pub fn image_ready(&mut self, detections: usize) {
        self.mode = Mode::ImageDisplayed;
        self.status = Status::Message(format!("Image processed: {} detections", detections));
    }

    pub fn image_failed(&mut self, err: &anyhow::Error) {
        self.mode = Mode::Idle;
        self.status = Status::Error(format!("{:#}", err));
    }

    pub fn image_closed(&mut self) {
        if self.mode == Mode::ImageDisplayed {
            self.mode = Mode::Idle;
            self.status = Status::Ready;
        }
    }

    pub fn image_saved(&mut self, path: &std::path::Path) {
        self.status = Status::Message(format!("Image saved to {}", path.display()));
    }

    pub fn save_failed(&mut self, err: &anyhow::Error) {
        self.status = Status::Error(format!("{:#}", err));
    }

    pub fn begin_pick_color(&mut self) {
        self.picking_color = true;
        self.status = Status::PickingColor;
    }

    /// Close the picker; `Some` applies the color, `None` cancels.
    pub fn finish_pick_color(&mut self, color: Option<Rgb<u8>>) -> Option<Rgb<u8>> {
        self.picking_color = false;
        self.status = self.resting_status();
        let color = color?;
        self.person_color = color;
        Some(color)
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn dismiss_summary(&mut self) {
        self.summary = None;
    }

    pub fn request_exit(&mut self) {
        self.mode = Mode::Exiting;
        self.status = Status::Exiting;
    }

    fn resting_status(&self) -> Status {
        match self.mode {
            Mode::CameraRunning { paused: true, .. } => Status::Paused,
            Mode::CameraRunning { .. } => Status::CameraRunning,
            Mode::LaunchingCamera => Status::LaunchingCamera,
            Mode::ProcessingImage => Status::UploadingImage,
            Mode::Exiting => Status::Exiting,
            Mode::Idle | Mode::ImageDisplayed => Status::Ready,
        }
    }
}
