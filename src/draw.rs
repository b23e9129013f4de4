//! Per-face overlay drawing: tracking points, the valence-colored bounding
//! box, appearance and emoji markers, and the dominant emotion label.

use std::sync::Arc;

use ab_glyph::FontArc;
use image::imageops::overlay;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use tracing::{trace, warn};

use crate::assets::{MarkerCache, MarkerKey};
use crate::config::{FrameSettings, Geometry, Style};
use crate::face::DetectedFace;
use crate::metrics::Metric;
use crate::shapes::point::PointF32;
use crate::shapes::rect::BoundingRect;

/// Maps a landmark from source-image space onto the surface. Mirrored
/// previews flip x around the image width.
pub fn transform_point(p: PointF32, geometry: &Geometry, mirrored: bool) -> PointF32 {
    let x = if mirrored {
        (geometry.image_width as f32 - p.x) * geometry.scale_ratio
    } else {
        p.x * geometry.scale_ratio
    };

    PointF32::new(x, p.y * geometry.scale_ratio)
}

/// Red at -100, white at 0, green at +100, linear in between.
pub fn valence_color(valence: f32) -> Rgba<u8> {
    let valence = valence.clamp(-100., 100.);
    if valence > 0. {
        let c = ((100. - valence) / 100. * 255.) as u8;
        Rgba([c, 255, c, 255])
    } else {
        let c = ((100. + valence) / 100. * 255.) as u8;
        Rgba([255, c, c, 255])
    }
}

/// How far markers stacked beside `bounds` overflow it, split evenly above
/// and below.
pub fn height_offset(bounds: &BoundingRect, appearance_height: f32, emoji_height: f32, margin: f32) -> f32 {
    let spacing = if appearance_height > 0. && emoji_height > 0. {
        margin
    } else {
        0.
    };
    let required = appearance_height + emoji_height + spacing;

    (required - bounds.height() as f32).max(0.) / 2.
}

/// Half-width of the score bar behind the dominant emotion value.
pub fn metric_bar_half_width(bar_width: u32, score: f32) -> i32 {
    (bar_width as f32 / 200. * score).round() as i32
}

/// Outline of `bounds`, `thickness` pixels wide, centred on its edges.
pub fn draw_stroked_rect(canvas: &mut RgbaImage, bounds: &BoundingRect, thickness: u32, color: Rgba<u8>) {
    let t = thickness.max(1) as i32;
    let half = t / 2;

    for by in -half..(t - half) {
        if let Ok(rect) = Rect::try_from(bounds.outset(by)) {
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }
}

fn resolve_marker(cache: &mut MarkerCache, key: MarkerKey) -> Option<Arc<RgbaImage>> {
    match cache.marker(key) {
        Ok(img) => img,
        Err(e) => {
            warn!("Skipping marker {key:?}: {e}");
            None
        }
    }
}

/// Draws one face with the settings and style captured for the current frame.
pub struct FacePainter<'a> {
    pub settings: &'a FrameSettings,
    pub style: &'a Style,
}

impl FacePainter<'_> {
    /// Returns the surface-space bounding box the face was drawn around.
    pub fn draw_face(
        &self,
        canvas: &mut RgbaImage,
        face: &DetectedFace,
        mirrored: bool,
        multi_face: bool,
        cache: &mut MarkerCache,
    ) -> BoundingRect {
        let geometry = &self.settings.geometry;
        let mut bounds = BoundingRect::inverted(geometry.surface_width, geometry.surface_height);

        for p in &face.points {
            let p = transform_point(*p, geometry, mirrored);
            let (x, y) = p.rounded();
            bounds.union(x, y);

            if self.settings.draw_points {
                draw_filled_circle_mut(
                    canvas,
                    (x, y),
                    self.settings.thickness as i32,
                    self.style.tracking_point_color.0,
                );
            }
        }

        if bounds.is_empty() {
            trace!("Face with {} points has no area, skipping", face.points.len());
            return bounds;
        }

        if self.settings.draw_points {
            draw_stroked_rect(
                canvas,
                &bounds,
                self.settings.thickness,
                valence_color(face.emotions.valence),
            );
        }

        let appearance = resolve_marker(cache, face.appearance.into());
        let emoji = resolve_marker(cache, face.emojis.dominant.into());
        let offset = height_offset(
            &bounds,
            appearance.as_ref().map_or(0., |img| img.height() as f32),
            emoji.as_ref().map_or(0., |img| img.height() as f32),
            self.style.marker_margin,
        );
        let marker_x = (bounds.right as f32 + self.style.marker_margin).round() as i64;

        if self.settings.draw_appearance_markers {
            if let Some(img) = &appearance {
                let y = (bounds.bottom as f32 - img.height() as f32 + offset).round() as i64;
                overlay(canvas, &**img, marker_x, y);
            }
        }

        if self.settings.draw_emoji_markers {
            if let Some(img) = &emoji {
                let y = (bounds.top as f32 - offset).round() as i64;
                overlay(canvas, &**img, marker_x, y);
            }
        }

        if multi_face {
            self.draw_dominant_emotion(canvas, face, &bounds);
        }

        bounds
    }

    fn draw_dominant_emotion(&self, canvas: &mut RgbaImage, face: &DetectedFace, bounds: &BoundingRect) {
        let Some((emotion, score)) = face.emotions.dominant() else {
            return;
        };

        let style = self.style;
        let label = Metric::from(emotion).capitalized_name();
        let value = format!("{}%", score.round() as i32);
        let font = style.font.as_ref();

        let measure = |font: Option<&FontArc>, size: f32, text: &str| match font {
            Some(font) => text_size(size, font, text),
            None => (0, size.round() as u32),
        };
        let (label_w, label_h) = measure(font, style.label_text_size, &label);
        let (value_w, value_h) = measure(font, style.value_text_size, &value);

        let center_x = bounds.center_x();
        let label_baseline = bounds.bottom as f32 + style.marker_margin + label_h as f32;
        let value_baseline = label_baseline + style.marker_margin + value_h as f32;

        let half_width = metric_bar_half_width(style.metric_bar_width, score);
        if half_width > 0 && value_h > 0 {
            let bar = Rect::at(
                (center_x - half_width as f32).round() as i32,
                (value_baseline - value_h as f32).round() as i32,
            )
            .of_size(2 * half_width as u32, value_h);
            draw_filled_rect_mut(canvas, bar, style.metric_bar_color.0);
        }

        let Some(font) = font else {
            trace!("No font loaded, skipping dominant emotion text");
            return;
        };

        draw_text_mut(
            canvas,
            style.label_color.0,
            (center_x - label_w as f32 / 2.).round() as i32,
            (label_baseline - label_h as f32).round() as i32,
            style.label_text_size,
            font,
            &label,
        );
        draw_text_mut(
            canvas,
            style.value_color.0,
            (center_x - value_w as f32 / 2.).round() as i32,
            (value_baseline - value_h as f32).round() as i32,
            style.value_text_size,
            font,
            &value,
        );
    }
}
