use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use ab_glyph::FontArc;
use image::Rgba;
use serde::Deserialize;
use tracing::debug;

use crate::error::{OverlayError, Result};

/// Surface and source-image geometry. Only ever replaced as a whole so the
/// ratio always matches the widths it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub surface_width: u32,
    pub surface_height: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub scale_ratio: f32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            surface_width: 0,
            surface_height: 0,
            image_width: 1,
            image_height: 0,
            scale_ratio: 0.,
        }
    }
}

/// Everything the render loop reads from [`ViewConfig`] at the top of an
/// iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSettings {
    pub geometry: Geometry,
    pub thickness: u32,
    pub draw_points: bool,
    pub draw_appearance_markers: bool,
    pub draw_emoji_markers: bool,
}

/// Geometry and drawing toggles shared between the host and the render loop.
///
/// Toggles and thickness are plain atomics read without locking; a change
/// lands on the next iteration at the latest.
#[derive(Debug)]
pub struct ViewConfig {
    geometry: RwLock<Geometry>,
    dimensions_needed: AtomicBool,
    draw_thickness: AtomicU32,
    draw_points: AtomicBool,
    draw_appearance_markers: AtomicBool,
    draw_emoji_markers: AtomicBool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            geometry: RwLock::new(Geometry::default()),
            dimensions_needed: AtomicBool::new(true),
            draw_thickness: AtomicU32::new(0),
            draw_points: AtomicBool::new(true),
            draw_appearance_markers: AtomicBool::new(true),
            draw_emoji_markers: AtomicBool::new(true),
        }
    }
}

impl ViewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_dimensions(
        &self,
        surface_width: i32,
        surface_height: i32,
        image_width: i32,
        image_height: i32,
    ) -> Result<()> {
        if surface_width <= 0 || surface_height <= 0 || image_width <= 0 || image_height <= 0 {
            return Err(OverlayError::InvalidDimensions {
                surface_width,
                surface_height,
                image_width,
                image_height,
            });
        }

        let geometry = Geometry {
            surface_width: surface_width as u32,
            surface_height: surface_height as u32,
            image_width: image_width as u32,
            image_height: image_height as u32,
            scale_ratio: surface_width as f32 / image_width as f32,
        };
        debug!("Updated view geometry: {geometry:?}");

        *self.geometry.write().unwrap_or_else(PoisonError::into_inner) = geometry;
        self.dimensions_needed.store(false, Ordering::Release);

        Ok(())
    }

    pub fn geometry(&self) -> Geometry {
        *self.geometry.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_dimensions_needed(&self) -> bool {
        self.dimensions_needed.load(Ordering::Acquire)
    }

    pub fn invalidate_dimensions(&self) {
        self.dimensions_needed.store(true, Ordering::Release);
    }

    pub fn set_draw_thickness(&self, thickness: i32) -> Result<()> {
        if thickness <= 0 {
            return Err(OverlayError::InvalidThickness(thickness));
        }

        self.draw_thickness.store(thickness as u32, Ordering::Relaxed);
        Ok(())
    }

    pub fn draw_thickness(&self) -> u32 {
        self.draw_thickness.load(Ordering::Relaxed)
    }

    pub fn set_draw_points(&self, enabled: bool) {
        self.draw_points.store(enabled, Ordering::Relaxed);
    }

    pub fn draw_points(&self) -> bool {
        self.draw_points.load(Ordering::Relaxed)
    }

    pub fn set_draw_appearance_markers(&self, enabled: bool) {
        self.draw_appearance_markers.store(enabled, Ordering::Relaxed);
    }

    pub fn draw_appearance_markers(&self) -> bool {
        self.draw_appearance_markers.load(Ordering::Relaxed)
    }

    pub fn set_draw_emoji_markers(&self, enabled: bool) {
        self.draw_emoji_markers.store(enabled, Ordering::Relaxed);
    }

    pub fn draw_emoji_markers(&self) -> bool {
        self.draw_emoji_markers.load(Ordering::Relaxed)
    }

    pub fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            geometry: self.geometry(),
            thickness: self.draw_thickness(),
            draw_points: self.draw_points(),
            draw_appearance_markers: self.draw_appearance_markers(),
            draw_emoji_markers: self.draw_emoji_markers(),
        }
    }
}

/// Render loop pacing and face buffer sizing.
#[derive(Debug, Clone, Copy)]
pub struct RendererOptions {
    /// Minimum time between loop iterations, also the back-off while the
    /// surface is unavailable.
    pub frame_interval: Duration,
    pub max_faces: usize,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            max_faces: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Color(pub Rgba<u8>);

impl TryFrom<String> for Color {
    type Error = OverlayError;

    fn try_from(s: String) -> Result<Color> {
        parse_hex_color(&s).map(Color)
    }
}

/// Parses `#rrggbb` or `#aarrggbb`.
pub fn parse_hex_color(s: &str) -> Result<Rgba<u8>> {
    let invalid = || OverlayError::InvalidColor(s.to_string());
    let hex = s.strip_prefix('#').ok_or_else(invalid)?;
    let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;

    let [a, r, g, b] = match hex.len() {
        6 => (value | 0xff00_0000).to_be_bytes(),
        8 => value.to_be_bytes(),
        _ => return Err(invalid()),
    };

    Ok(Rgba([r, g, b, a]))
}

/// Colors, sizes and font for everything drawn besides the bounding box.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Style {
    pub tracking_point_color: Color,
    pub label_color: Color,
    pub value_color: Color,
    pub metric_bar_color: Color,
    pub label_text_size: f32,
    pub value_text_size: f32,
    pub metric_bar_width: u32,
    pub marker_margin: f32,
    pub font_path: Option<PathBuf>,
    #[serde(skip)]
    pub font: Option<FontArc>,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            tracking_point_color: Color(Rgba([255, 255, 255, 255])),
            label_color: Color(Rgba([0xff, 0x80, 0x00, 255])),
            value_color: Color(Rgba([0x51, 0x4a, 0x40, 255])),
            metric_bar_color: Color(Rgba([0, 255, 0, 255])),
            label_text_size: 48.,
            value_text_size: 36.,
            metric_bar_width: 150,
            marker_margin: 4.,
            font_path: None,
            font: None,
        }
    }
}

impl Style {
    pub fn load(path: &Path) -> Result<Style> {
        let content = std::fs::read_to_string(path).map_err(|source| OverlayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut style: Style =
            serde_json::from_str(&content).map_err(|source| OverlayError::Style {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(font_path) = style.font_path.clone() {
            style.load_font(&font_path)?;
        }

        Ok(style)
    }

    pub fn load_font(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path).map_err(|source| OverlayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let font =
            FontArc::try_from_vec(bytes).map_err(|_| OverlayError::InvalidFont(path.to_path_buf()))?;

        self.font_path = Some(path.to_path_buf());
        self.font = Some(font);
        Ok(())
    }
}
