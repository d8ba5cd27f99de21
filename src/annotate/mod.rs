//! Drawing detections onto images.
//!
//! `ColorPolicy` decides colors, `Annotator` draws boxes and HUD text, and
//! `display` handles scaling for the screen and saving to disk.

mod annotator;
mod colors;
pub mod display;

pub use annotator::{percent_to_cutoff, Annotated, Annotator, HudOverlay, RenderedBox};
pub use colors::{parse_rgb, ColorMode, ColorPolicy, DEFAULT_PERSON_COLOR, PERSON_LABEL};
pub use display::{fit_within, resize_for_display, save_image};
