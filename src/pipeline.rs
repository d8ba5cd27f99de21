//! Capture, inference and annotation, for single images and live sessions.
//!
//! A live session runs on a `camera-worker` thread that owns the camera and
//! the `DetectionContext` for its whole lifetime. The shell talks to it over
//! two channels: `WorkerControl` messages in, `WorkerEvent`s out. Frame events
//! go through a bounded queue and are dropped when the consumer falls behind.
//! When the session ends the context is handed back through the join handle.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError, TrySendError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

use crate::annotate::{
    percent_to_cutoff, resize_for_display, Annotator, ColorPolicy, HudOverlay, RenderedBox,
};
use crate::config::{AppConfig, DisplaySettings};
use crate::detect::{detect_timed, open_backend, DetectorBackend};
use crate::ingest::{FrameSource, ImageFileSource};
use crate::session::{SessionCommand, SessionState, SessionStats, SessionSummary};

const PAUSE_POLL: Duration = Duration::from_millis(20);
const DEFAULT_QUEUE_DEPTH: usize = 2;
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Everything needed to turn an image into an annotated image.
pub struct DetectionContext {
    pub backend: Box<dyn DetectorBackend>,
    pub colors: ColorPolicy,
    pub annotator: Annotator,
}

impl DetectionContext {
    pub fn new(backend: Box<dyn DetectorBackend>, colors: ColorPolicy) -> Result<Self> {
        Ok(Self {
            backend,
            colors,
            annotator: Annotator::new()?,
        })
    }

    /// Open the configured backend and color policy.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let backend = open_backend(&cfg.detector)?;
        let context = Self::new(backend, ColorPolicy::new(cfg.color_mode, cfg.person_color))?;
        log::info!(
            "pipeline: {} detector ready ({:?} label colors)",
            context.backend.name(),
            context.colors.mode()
        );
        Ok(context)
    }
}

/// Result of annotating one still image.
#[derive(Clone, Debug)]
pub struct ImageOutcome {
    pub image: RgbImage,
    pub rendered: Vec<RenderedBox>,
    pub inference: Duration,
}

/// Detect and draw on a full-resolution image.
pub fn process_image(
    context: &mut DetectionContext,
    mut image: RgbImage,
    cutoff: f32,
) -> Result<ImageOutcome> {
    let timed = detect_timed(context.backend.as_mut(), &image)?;
    let rendered = context.annotator.annotate_in_place(
        &mut image,
        &timed.detections,
        cutoff,
        &mut context.colors,
    );
    log::info!(
        "pipeline: {} of {} detections at cutoff {:.2} ({} ms)",
        rendered.len(),
        timed.detections.len(),
        cutoff,
        timed.inference.as_millis()
    );
    Ok(ImageOutcome {
        image,
        rendered,
        inference: timed.inference,
    })
}

/// Decode an image file and run `process_image` on it.
pub fn process_image_file(
    context: &mut DetectionContext,
    path: &Path,
    cutoff: f32,
) -> Result<ImageOutcome> {
    let mut source = ImageFileSource::new(path)?;
    source.connect()?;
    let frame = source
        .next_frame()?
        .ok_or_else(|| anyhow!("{} produced no image", path.display()))?;
    source.release();
    process_image(context, frame.into_image(), cutoff)
}

/// Single-image detection on a background thread.
///
/// Lets the shell keep drawing a loading indicator while the model runs.
pub struct ImageJob {
    path: PathBuf,
    join: JoinHandle<(DetectionContext, Result<ImageOutcome>)>,
}

impl ImageJob {
    pub fn spawn(mut context: DetectionContext, path: PathBuf, cutoff: f32) -> Result<Self> {
        let job_path = path.clone();
        let join = std::thread::Builder::new()
            .name("image-job".to_string())
            .spawn(move || {
                let result = process_image_file(&mut context, &job_path, cutoff);
                (context, result)
            })
            .context("failed to spawn image job thread")?;
        Ok(Self { path, join })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the job is done. The context comes back with the result.
    pub fn wait(self) -> Result<(DetectionContext, Result<ImageOutcome>)> {
        self.join
            .join()
            .map_err(|_| anyhow!("image job thread panicked"))
    }
}

/// Per-session knobs for live detection.
#[derive(Clone, Debug)]
pub struct LiveSettings {
    pub display: DisplaySettings,
    pub threshold_percent: u8,
    /// Frames buffered between the worker and the consumer.
    pub queue_depth: usize,
}

impl LiveSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            display: cfg.display,
            threshold_percent: cfg.threshold_percent,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            display: DisplaySettings::default(),
            threshold_percent: 50,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Messages from the shell to a running session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerControl {
    SetThreshold(u8),
    SetPersonColor(Rgb<u8>),
    Command(SessionCommand),
    Stop,
}

/// One processed live frame, scaled for display.
#[derive(Clone, Debug)]
pub struct LiveFrame {
    pub sequence: u64,
    pub image: RgbImage,
    /// `None` while overlays are hidden.
    pub hud: Option<HudOverlay>,
    pub rendered: Vec<RenderedBox>,
}

#[derive(Clone, Debug)]
pub enum WorkerEvent {
    Started { device: String },
    Frame(LiveFrame),
    Paused(bool),
    Finished,
}

/// How a live session ended.
#[derive(Debug)]
pub struct SessionReport {
    pub summary: SessionSummary,
    /// Set when a read or inference failure cut the session short.
    pub error: Option<anyhow::Error>,
}

/// Drive one live session until exit, end of stream, or failure.
///
/// Returns `Err` only when the source cannot be opened; failures after that
/// end up in `SessionReport::error`. The source is released on every path.
pub fn run_camera_session(
    context: &mut DetectionContext,
    source: &mut dyn FrameSource,
    settings: &LiveSettings,
    control: &Receiver<WorkerControl>,
    sink: &mut dyn FnMut(WorkerEvent) -> ControlFlow<()>,
) -> Result<SessionReport> {
    if let Err(err) = source.connect() {
        log::error!("pipeline: camera session aborted: {:#}", err);
        source.release();
        return Err(err);
    }
    log::info!("pipeline: camera session started on {}", source.name());

    let mut state = SessionState::default();
    let mut stats = SessionStats::new();
    let mut cutoff = percent_to_cutoff(settings.threshold_percent);
    let mut error = None;
    let mut last_health_log: Option<Instant> = None;

    if sink(WorkerEvent::Started {
        device: source.name().to_string(),
    })
    .is_break()
    {
        state.exit_requested = true;
    }

    while !state.exit_requested {
        let was_paused = state.paused;
        drain_control(control, context, &mut state, &mut cutoff);
        if state.exit_requested {
            break;
        }
        if state.paused != was_paused && sink(WorkerEvent::Paused(state.paused)).is_break() {
            break;
        }
        if state.paused {
            std::thread::sleep(PAUSE_POLL);
            continue;
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("pipeline: {} reached end of stream", source.name());
                break;
            }
            Err(err) => {
                log::error!("pipeline: camera session aborted: {:#}", err);
                error = Some(err);
                break;
            }
        };

        if last_health_log.map_or(true, |at| at.elapsed() >= HEALTH_LOG_INTERVAL) {
            if source.is_healthy() {
                log::info!(
                    "pipeline: {} healthy, {} frames processed",
                    source.name(),
                    stats.frames()
                );
            } else {
                log::warn!("pipeline: {} reports unhealthy after a read", source.name());
            }
            last_health_log = Some(Instant::now());
        }

        let sequence = frame.sequence;
        let mut image = resize_for_display(frame.image(), &settings.display);
        let timed = match detect_timed(context.backend.as_mut(), &image) {
            Ok(timed) => timed,
            Err(err) => {
                log::error!("pipeline: inference failed on frame {}: {:#}", sequence, err);
                error = Some(err);
                break;
            }
        };
        log::debug!(
            "pipeline: frame {} inferred in {} ms ({} ms after capture)",
            sequence,
            timed.inference.as_millis(),
            frame.age().as_millis()
        );

        let (hud, rendered) = if state.overlay_visible {
            let rendered = context.annotator.annotate_in_place(
                &mut image,
                &timed.detections,
                cutoff,
                &mut context.colors,
            );
            let hud = stats.record_frame(timed.fps(), &rendered);
            context.annotator.draw_hud(&mut image, &hud);
            (Some(hud), rendered)
        } else {
            stats.record_fps(timed.fps());
            (None, Vec::new())
        };

        let event = WorkerEvent::Frame(LiveFrame {
            sequence,
            image,
            hud,
            rendered,
        });
        if sink(event).is_break() {
            log::info!("pipeline: frame consumer gone; stopping session");
            break;
        }
    }

    source.release();
    let summary = stats.summary();
    log::info!(
        "pipeline: camera session ended after {} frames ({} detections)",
        summary.frames,
        summary.total_detections
    );
    Ok(SessionReport { summary, error })
}

fn drain_control(
    control: &Receiver<WorkerControl>,
    context: &mut DetectionContext,
    state: &mut SessionState,
    cutoff: &mut f32,
) {
    loop {
        match control.try_recv() {
            Ok(WorkerControl::SetThreshold(percent)) => *cutoff = percent_to_cutoff(percent),
            Ok(WorkerControl::SetPersonColor(color)) => context.colors.set_person_color(color),
            Ok(WorkerControl::Command(command)) => state.apply(command),
            Ok(WorkerControl::Stop) | Err(TryRecvError::Disconnected) => {
                state.exit_requested = true;
                return;
            }
            Err(TryRecvError::Empty) => return,
        }
    }
}

/// What a finished worker hands back.
pub struct WorkerOutcome {
    pub context: DetectionContext,
    pub result: Result<SessionReport>,
}

/// Handle to a live session running on its own thread.
pub struct CameraWorker {
    control: Sender<WorkerControl>,
    events: Receiver<WorkerEvent>,
    join: Option<JoinHandle<WorkerOutcome>>,
}

impl CameraWorker {
    pub fn spawn(
        context: DetectionContext,
        source: Box<dyn FrameSource>,
        settings: LiveSettings,
    ) -> Result<Self> {
        let (control_tx, control_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::sync_channel(settings.queue_depth.max(1));

        let join = std::thread::Builder::new()
            .name("camera-worker".to_string())
            .spawn(move || worker_main(context, source, settings, control_rx, events_tx))
            .context("failed to spawn camera worker thread")?;

        Ok(Self {
            control: control_tx,
            events: events_rx,
            join: Some(join),
        })
    }

    /// Forward a control message. False once the worker has exited.
    pub fn send(&self, message: WorkerControl) -> bool {
        self.control.send(message).is_ok()
    }

    pub fn stop(&self) {
        self.send(WorkerControl::Stop);
    }

    /// Events queued since the last call.
    pub fn poll(&self) -> Vec<WorkerEvent> {
        self.events.try_iter().collect()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Wait for the worker thread and take back its context.
    pub fn join(mut self) -> Result<WorkerOutcome> {
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("camera worker already joined"))?;
        join.join()
            .map_err(|_| anyhow!("camera worker thread panicked"))
    }
}

impl Drop for CameraWorker {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            self.control.send(WorkerControl::Stop).ok();
            // Unblock a worker waiting on a full queue.
            while !join.is_finished() {
                self.events.try_iter().for_each(drop);
                std::thread::sleep(PAUSE_POLL);
            }
            if join.join().is_err() {
                log::warn!("pipeline: camera worker panicked during shutdown");
            }
        }
    }
}

fn worker_main(
    mut context: DetectionContext,
    mut source: Box<dyn FrameSource>,
    settings: LiveSettings,
    control: Receiver<WorkerControl>,
    events: SyncSender<WorkerEvent>,
) -> WorkerOutcome {
    let mut dropped = 0u64;
    let mut sink = |event: WorkerEvent| match event {
        WorkerEvent::Frame(frame) => match events.try_send(WorkerEvent::Frame(frame)) {
            Ok(()) => ControlFlow::Continue(()),
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                log::debug!("pipeline: display queue full; dropped frame ({} total)", dropped);
                ControlFlow::Continue(())
            }
            Err(TrySendError::Disconnected(_)) => ControlFlow::Break(()),
        },
        other => match events.send(other) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        },
    };
    let result = run_camera_session(
        &mut context,
        source.as_mut(),
        &settings,
        &control,
        &mut sink,
    );
    events.send(WorkerEvent::Finished).ok();
    WorkerOutcome { context, result }
}
