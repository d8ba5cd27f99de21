//! Still-image frame source.
//!
//! `ImageFileSource` turns one image on local disk into a one-frame sequence.
//! The image is decoded on `connect` (or lazily on the first `next_frame`),
//! handed out once, and can be replayed with `rewind`.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::frame::Frame;

/// Extensions offered by the upload dialog.
pub const UPLOAD_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Single still-image source.
pub struct ImageFileSource {
    path: PathBuf,
    name: String,
    decoded: Option<RgbImage>,
    consumed: bool,
}

impl ImageFileSource {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        if name.trim().is_empty() {
            return Err(anyhow!("image path must not be empty"));
        }
        if name.contains("://") {
            return Err(anyhow!(
                "image upload only supports local paths (no URL schemes)"
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            name,
            decoded: None,
            consumed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make the image available again.
    pub fn rewind(&mut self) {
        self.consumed = false;
    }

    fn decode(&mut self) -> Result<&RgbImage> {
        if self.decoded.is_none() {
            let image = image::open(&self.path)
                .with_context(|| format!("failed to read image {}", self.path.display()))?;
            log::info!(
                "ImageFileSource: decoded {} ({}x{})",
                self.name,
                image.width(),
                image.height()
            );
            self.decoded = Some(image.to_rgb8());
        }
        self.decoded
            .as_ref()
            .ok_or_else(|| anyhow!("image {} not decoded", self.name))
    }
}

impl FrameSource for ImageFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<()> {
        self.decode()?;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.consumed {
            return Ok(None);
        }
        let image = self.decode()?.clone();
        self.consumed = true;
        Ok(Some(Frame::new(image, 1)))
    }

    fn release(&mut self) {
        self.decoded = None;
    }
}

/// True when the path carries one of the upload dialog's extensions.
pub fn is_supported_upload(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            UPLOAD_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
