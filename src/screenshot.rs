use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::imageops::{FilterType, overlay, resize};
use image::{ImageFormat, RgbaImage};
use tracing::{Level, debug, span};

use crate::error::{OverlayError, Result};

const FILE_NAME_FORMAT: &str = "%Y-%m-%d_%I-%M-%S";

/// Stacks `overlays` over the camera `frame`. Each overlay is stretched to
/// the frame width, keeping its aspect ratio, and alpha blended from the top
/// left corner.
pub fn compose(frame: &RgbaImage, overlays: &[&RgbaImage]) -> RgbaImage {
    let span = span!(Level::DEBUG, "compose_screenshot");
    let _guard = span.enter();

    let mut out = frame.clone();
    let width = frame.width();

    for layer in overlays {
        if layer.width() == 0 || layer.height() == 0 {
            continue;
        }

        if layer.width() == width {
            overlay(&mut out, *layer, 0, 0);
            continue;
        }

        let ratio = width as f32 / layer.width() as f32;
        let height = (layer.height() as f32 * ratio).round() as u32;
        let scaled = resize(*layer, width, height.max(1), FilterType::Triangle);
        overlay(&mut out, &scaled, 0, 0);
    }

    out
}

pub fn screenshot_file_name(now: &DateTime<Local>) -> String {
    format!("{}.png", now.format(FILE_NAME_FORMAT))
}

/// Name of the frame saved without overlays next to a screenshot.
pub fn raw_file_name(now: &DateTime<Local>) -> String {
    format!("{}_raw.png", now.format(FILE_NAME_FORMAT))
}

/// Paths written by [`save_screenshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedScreenshot {
    pub composed: PathBuf,
    pub raw: Option<PathBuf>,
}

/// Writes `frame` with `overlay` composed on top into `dir`, and the bare
/// frame as well when `also_raw` is set.
pub fn save_screenshot(
    dir: &Path,
    now: &DateTime<Local>,
    frame: &RgbaImage,
    overlay: &RgbaImage,
    also_raw: bool,
) -> Result<SavedScreenshot> {
    std::fs::create_dir_all(dir).map_err(|source| OverlayError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let composed = dir.join(screenshot_file_name(now));
    write_png(&compose(frame, &[overlay]), &composed)?;
    debug!("Saved screenshot to {composed:?}");

    let raw = if also_raw {
        let raw = dir.join(raw_file_name(now));
        write_png(frame, &raw)?;
        Some(raw)
    } else {
        None
    };

    Ok(SavedScreenshot { composed, raw })
}

fn write_png(img: &RgbaImage, path: &Path) -> Result<()> {
    img.save_with_format(path, ImageFormat::Png)
        .map_err(|source| OverlayError::Encode {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgba;

    fn at(h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, h, 5, 9).unwrap()
    }

    #[test]
    fn test_file_names() {
        assert_eq!(screenshot_file_name(&at(15)), "2024-03-07_03-05-09.png");
        assert_eq!(screenshot_file_name(&at(0)), "2024-03-07_12-05-09.png");
        assert_eq!(raw_file_name(&at(9)), "2024-03-07_09-05-09_raw.png");
    }

    #[test]
    fn test_compose_scales_overlay_to_frame() {
        let frame = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255]));
        let mut layer = RgbaImage::new(4, 2);
        layer.put_pixel(3, 1, Rgba([255, 0, 0, 255]));

        let out = compose(&frame, &[&layer]);
        assert_eq!(out.dimensions(), (8, 8));
        // Transparent areas keep the frame
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
        // Overlay stretched to 8x4, so nothing below row 4
        assert_eq!(*out.get_pixel(7, 6), Rgba([0, 0, 255, 255]));
        assert_eq!(*out.get_pixel(7, 3), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_compose_layers_in_order() {
        let frame = RgbaImage::new(2, 2);
        let first = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let second = RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255]));

        let out = compose(&frame, &[&first, &second]);
        assert_eq!(*out.get_pixel(1, 1), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_save_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("shots");
        let frame = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let layer = RgbaImage::from_pixel(4, 4, Rgba([200, 0, 0, 255]));

        let saved = save_screenshot(&out_dir, &at(10), &frame, &layer, true).unwrap();
        assert_eq!(saved.composed, out_dir.join("2024-03-07_10-05-09.png"));

        let composed = image::open(&saved.composed).unwrap().into_rgba8();
        assert_eq!(*composed.get_pixel(0, 0), Rgba([200, 0, 0, 255]));

        let raw = image::open(saved.raw.unwrap()).unwrap().into_rgba8();
        assert_eq!(raw, frame);
    }
}
