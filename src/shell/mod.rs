//! Presentation shell.
//!
//! `ShellModel` holds the mode, status text and user choices and is plain
//! Rust; the eframe front end (feature: gui) renders it and forwards user
//! input to the pipeline.

#[cfg(feature = "gui")]
mod app;
mod state;

#[cfg(feature = "gui")]
pub use app::LiveDetectApp;
pub use state::{Mode, ShellModel, Status};
