use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};

use crate::config::DisplaySettings;

/// Extensions accepted when saving; the first is the default.
pub const SAVE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Largest size with the same aspect ratio that fits inside the bounds.
///
/// Never upscales: a size already within the bounds comes back unchanged.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let scale = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    if scale >= 1.0 {
        return (width, height);
    }
    let fitted_w = ((width as f64 * scale).round() as u32).clamp(1, max_width.max(1));
    let fitted_h = ((height as f64 * scale).round() as u32).clamp(1, max_height.max(1));
    (fitted_w, fitted_h)
}

/// Scale an image down to the display bounds.
pub fn resize_for_display(image: &RgbImage, display: &DisplaySettings) -> RgbImage {
    let (width, height) = fit_within(
        image.width(),
        image.height(),
        display.max_width,
        display.max_height,
    );
    if (width, height) == image.dimensions() {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Lanczos3)
}

/// Path with `.png` appended when it has no extension.
pub fn with_default_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(_) => path.to_path_buf(),
        None => path.with_extension(SAVE_EXTENSIONS[0]),
    }
}

/// Write an annotated image as png or jpg, chosen by extension.
///
/// Returns the path actually written.
pub fn save_image(image: &RgbImage, path: &Path) -> Result<PathBuf> {
    let path = with_default_extension(path);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let format = match extension.as_str() {
        "png" => ImageFormat::Png,
        "jpg" | "jpeg" => ImageFormat::Jpeg,
        other => {
            return Err(anyhow!(
                "cannot save as '.{}' (supported: {})",
                other,
                SAVE_EXTENSIONS.join(", ")
            ))
        }
    };
    image
        .save_with_format(&path, format)
        .with_context(|| format!("failed to save image to {}", path.display()))?;
    log::info!("display: saved annotated image to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_preserving_aspect() {
        assert_eq!(fit_within(1600, 1200, 800, 800), (800, 600));
        assert_eq!(fit_within(1200, 1600, 800, 800), (600, 800));
        assert_eq!(fit_within(4000, 1000, 800, 800), (800, 200));
    }

    #[test]
    fn small_images_are_unchanged() {
        assert_eq!(fit_within(640, 480, 800, 800), (640, 480));
        assert_eq!(fit_within(800, 800, 800, 800), (800, 800));
    }

    #[test]
    fn never_exceeds_bounds() {
        for (w, h) in [(801, 3), (3, 801), (1920, 1080), (1000, 999), (12345, 777)] {
            let (fw, fh) = fit_within(w, h, 800, 800);
            assert!(fw <= 800 && fh <= 800, "{}x{} -> {}x{}", w, h, fw, fh);
            assert!(fw >= 1 && fh >= 1);
        }
    }

    #[test]
    fn resize_matches_fit() {
        let image = RgbImage::new(1000, 500);
        let resized = resize_for_display(&image, &DisplaySettings::default());
        assert_eq!(resized.dimensions(), (800, 400));
    }

    #[test]
    fn saves_with_default_png_extension() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let written = save_image(&RgbImage::new(4, 4), &dir.path().join("result"))?;
        assert_eq!(written.extension().and_then(|e| e.to_str()), Some("png"));
        assert!(written.exists());
        Ok(())
    }

    #[test]
    fn rejects_unknown_extension() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(save_image(&RgbImage::new(4, 4), &dir.path().join("result.gif")).is_err());
        Ok(())
    }
}
