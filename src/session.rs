//! Camera session state: key commands, pause/overlay flags and statistics.

use std::collections::BTreeMap;
use std::fmt;

use crate::annotate::{HudOverlay, RenderedBox};

/// Commands the camera view accepts while a session runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    Exit,
    TogglePause,
    ToggleOverlay,
}

/// Map a key press to a session command. Case-insensitive.
pub fn key_to_command(key: char) -> Option<SessionCommand> {
    match key.to_ascii_lowercase() {
        'p' | '\u{1b}' => Some(SessionCommand::Exit),
        'r' => Some(SessionCommand::TogglePause),
        't' => Some(SessionCommand::ToggleOverlay),
        _ => None,
    }
}

/// Flags a running session toggles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub paused: bool,
    pub overlay_visible: bool,
    pub exit_requested: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            paused: false,
            overlay_visible: true,
            exit_requested: false,
        }
    }
}

impl SessionState {
    pub fn apply(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Exit => self.exit_requested = true,
            SessionCommand::TogglePause => {
                self.paused = !self.paused;
                log::info!(
                    "session: {}",
                    if self.paused { "paused" } else { "resumed" }
                );
            }
            SessionCommand::ToggleOverlay => {
                self.overlay_visible = !self.overlay_visible;
                log::info!(
                    "session: overlays {}",
                    if self.overlay_visible { "shown" } else { "hidden" }
                );
            }
        }
    }
}

/// Running counters for one camera session.
///
/// Only frames processed with overlays visible contribute detections; every
/// inferred frame contributes to the FPS average.
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    frames: u64,
    total_detections: u64,
    fps_sum: f64,
    class_totals: BTreeMap<String, u64>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one inferred frame and return the HUD for it.
    pub fn record_frame(&mut self, fps: f32, rendered: &[RenderedBox]) -> HudOverlay {
        self.record_fps(fps);

        let mut class_counts = BTreeMap::new();
        for rendered_box in rendered {
            *class_counts.entry(rendered_box.label.clone()).or_insert(0usize) += 1;
            *self
                .class_totals
                .entry(rendered_box.label.clone())
                .or_insert(0) += 1;
        }
        self.total_detections += rendered.len() as u64;

        HudOverlay {
            fps,
            total_detections: self.total_detections,
            class_counts,
        }
    }

    /// Record a frame inferred with overlays hidden.
    pub fn record_fps(&mut self, fps: f32) {
        self.frames += 1;
        self.fps_sum += f64::from(fps);
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn total_detections(&self) -> u64 {
        self.total_detections
    }

    pub fn average_fps(&self) -> f32 {
        if self.frames == 0 {
            return 0.0;
        }
        (self.fps_sum / self.frames as f64) as f32
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            frames: self.frames,
            total_detections: self.total_detections,
            average_fps: self.average_fps(),
            class_counts: self.class_totals.clone(),
        }
    }
}

/// End-of-session report.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSummary {
    pub frames: u64,
    pub total_detections: u64,
    pub average_fps: f32,
    pub class_counts: BTreeMap<String, u64>,
}

impl SessionSummary {
    /// Text lines as shown in the statistics window.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Total Detections: {}", self.total_detections),
            format!("Average FPS: {:.2}", self.average_fps),
        ];
        for (label, count) in &self.class_counts {
            lines.push(format!("{}: {}", label, count));
        }
        lines
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session Statistics ({} frames)", self.frames)?;
        for line in self.lines() {
            writeln!(f, "  {}", line)?;
        }
        Ok(())
    }
}
