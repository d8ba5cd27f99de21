//! Live Detect
//!
//! Object detection over a camera feed or a single still image, with boxes,
//! labels and a small desktop control panel.
//!
//! # Architecture
//!
//! Frames flow in one direction:
//!
//! 1. **Frame source** (`ingest`): a decoded image file or a capture device.
//! 2. **Detector** (`detect`): a pretrained model behind `DetectorBackend`.
//! 3. **Annotator** (`annotate`): boxes, labels and HUD text drawn with the
//!    colors chosen by a `ColorPolicy`.
//! 4. **Shell** (`shell`): renders the result and turns user input into
//!    commands for the pipeline.
//!
//! Live sessions run on a worker thread (`pipeline`) that owns the camera and
//! detector; the shell talks to it over channels only.
//!
//! # Module Structure
//!
//! - `config`: file + environment configuration
//! - `frame`: captured image plus sequence number
//! - `ingest`: image file and camera sources, `CaptureError`
//! - `detect`: detections, backends, YOLOv8 decoding
//! - `annotate`: color policy, drawing, display scaling, saving
//! - `session`: key commands, pause/overlay state, statistics
//! - `pipeline`: still-image processing and the camera worker
//! - `shell`: UI state machine and the eframe front end (feature: gui)

pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod session;
pub mod shell;

pub use annotate::{Annotator, ColorMode, ColorPolicy, HudOverlay, RenderedBox};
pub use config::{AppConfig, ConfigOverrides, DetectorSettings, DisplaySettings};
pub use detect::{BoundingBox, Detection, DetectorBackend, StubBackend};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, CaptureError, FrameSource, ImageFileSource};
pub use pipeline::{
    process_image, process_image_file, run_camera_session, CameraWorker, DetectionContext,
    LiveFrame, LiveSettings, SessionReport, WorkerControl, WorkerEvent,
};
pub use session::{key_to_command, SessionCommand, SessionState, SessionStats, SessionSummary};
