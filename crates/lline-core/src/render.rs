//! Software compositor: base image, connector lines, and markers.
//!
//! Everything is plain f32 arithmetic over an RGBA buffer, so the same inputs
//! always produce the same bytes. Coverage is computed per pixel center from
//! signed distances, which gives anti-aliased edges without any supersampling.

use crate::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::types::{MarkerLayout, Point};
use image::imageops::FilterType;
use image::RgbaImage;

/// Straight-alpha RGBA color with components in 0.0–1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a,
        }
    }

    fn lerp(self, other: Color, t: f32) -> Color {
        Color {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }
}

const LINE_START: Color = Color::rgba(220, 38, 38, 0.8);
const LINE_END: Color = Color::rgba(185, 28, 28, 0.7);
const SHADOW: Color = Color::rgba(0, 0, 0, 0.1);
const SHADOW_BLUR: f32 = 5.0;
const SHADOW_OFFSET_Y: f32 = 2.0;
const BACKING: Color = Color::rgba(255, 255, 255, 1.0);
/// Extra radius of the white disc behind an icon, before scaling.
const BACKING_MARGIN: f32 = 3.0;
const FALLBACK_FILL: Color = Color::rgba(0x3B, 0x82, 0xF6, 1.0);
const FALLBACK_TEXT: Color = Color::rgba(255, 255, 255, 1.0);
const MIN_TEXT_HEIGHT: f32 = 10.0;

/// Raster canvas sized to the source image's natural dimensions.
#[derive(Debug, Clone, Default)]
pub struct RenderSurface {
    pixels: RgbaImage,
}

impl RenderSurface {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Read-only view of the composited pixels.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Owns the render surface; the only writer of its pixels.
#[derive(Debug, Default)]
pub struct Compositor {
    surface: RenderSurface,
    markers_drawn: usize,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    /// Number of markers in the most recent render.
    pub fn markers_drawn(&self) -> usize {
        self.markers_drawn
    }

    /// Redraw the whole surface from scratch.
    ///
    /// Markers are drawn in order, so later markers cover earlier ones.
    pub fn render(&mut self, base: &RgbaImage, markers: &[MarkerLayout]) {
        let (width, height) = base.dimensions();
        if self.surface.pixels.dimensions() != (width, height) {
            self.surface.pixels = RgbaImage::new(width, height);
        }

        let canvas = &mut self.surface.pixels;
        canvas.copy_from_slice(base.as_raw());

        for marker in markers {
            draw_connector(canvas, marker);
            draw_marker(canvas, marker);
        }
        self.markers_drawn = markers.len();

        tracing::debug!(width, height, markers = markers.len(), "surface composited");
    }
}

fn draw_connector(canvas: &mut RgbaImage, marker: &MarkerLayout) {
    let scale = marker.scale_factor;
    let half = marker.line_width() / 2.0;
    let offset = Point::new(0.0, SHADOW_OFFSET_Y * scale);

    let shadow_from = Point::new(marker.anchor.x + offset.x, marker.anchor.y + offset.y);
    let shadow_to = Point::new(marker.target.x + offset.x, marker.target.y + offset.y);
    let blur = (SHADOW_BLUR * scale).max(1.0);
    stroke_capsule(canvas, shadow_from, shadow_to, half, blur, |_| SHADOW);

    stroke_capsule(canvas, marker.anchor, marker.target, half, 1.0, |t| {
        LINE_START.lerp(LINE_END, t)
    });
}

fn draw_marker(canvas: &mut RgbaImage, marker: &MarkerLayout) {
    let center = marker.target;
    let diameter = marker.marker_diameter;

    match &marker.icon {
        Some(icon) => {
            let backing = diameter / 2.0 + BACKING_MARGIN * marker.scale_factor;
            fill_circle(canvas, center, backing, BACKING);
            draw_icon(canvas, icon, center, diameter);
        }
        None => {
            fill_circle(canvas, center, diameter / 2.0, FALLBACK_FILL);
            let text_height = MIN_TEXT_HEIGHT.max(diameter / 3.0);
            draw_text(canvas, &font::initials(&marker.display_name), center, text_height, FALLBACK_TEXT);
        }
    }
}

/// Source-over blend of `color` at `coverage` onto one pixel.
fn blend(canvas: &mut RgbaImage, x: u32, y: u32, color: Color, coverage: f32) {
    let sa = (color.a * coverage).clamp(0.0, 1.0);
    if sa <= 0.0 {
        return;
    }
    let dst = canvas.get_pixel_mut(x, y);
    let [dr, dg, db, da] = dst.0.map(|c| c as f32 / 255.0);

    let out_a = sa + da * (1.0 - sa);
    let mix = |s: f32, d: f32| (s * sa + d * da * (1.0 - sa)) / out_a;
    let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;

    dst.0 = [
        to_u8(mix(color.r, dr)),
        to_u8(mix(color.g, dg)),
        to_u8(mix(color.b, db)),
        to_u8(out_a),
    ];
}

/// Pixel index range covering `[lo, hi]`, clipped to `0..limit`.
fn span(lo: f32, hi: f32, limit: u32) -> std::ops::Range<u32> {
    let start = lo.floor().max(0.0) as u32;
    let end = (hi.ceil().max(0.0) as u32).min(limit);
    start.min(end)..end
}

/// Thick segment with round caps. `color_at` receives the projection parameter
/// along the segment (0 at `from`, 1 at `to`).
fn stroke_capsule(
    canvas: &mut RgbaImage,
    from: Point,
    to: Point,
    half_width: f32,
    feather: f32,
    color_at: impl Fn(f32) -> Color,
) {
    let reach = half_width + feather;
    let xs = span(from.x.min(to.x) - reach, from.x.max(to.x) + reach, canvas.width());
    let ys = span(from.y.min(to.y) - reach, from.y.max(to.y) + reach, canvas.height());

    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let len_sq = dx * dx + dy * dy;

    for y in ys {
        for x in xs.clone() {
            let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
            let t = if len_sq > 0.0 {
                (((px - from.x) * dx + (py - from.y) * dy) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let (cx, cy) = (from.x + dx * t, from.y + dy * t);
            let dist = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();

            let coverage = ((half_width + feather / 2.0 - dist) / feather).clamp(0.0, 1.0);
            if coverage > 0.0 {
                blend(canvas, x, y, color_at(t), coverage);
            }
        }
    }
}

fn fill_circle(canvas: &mut RgbaImage, center: Point, radius: f32, color: Color) {
    let xs = span(center.x - radius - 1.0, center.x + radius + 1.0, canvas.width());
    let ys = span(center.y - radius - 1.0, center.y + radius + 1.0, canvas.height());

    for y in ys {
        for x in xs.clone() {
            let dist = ((x as f32 + 0.5 - center.x).powi(2) + (y as f32 + 0.5 - center.y).powi(2)).sqrt();
            let coverage = (radius + 0.5 - dist).clamp(0.0, 1.0);
            if coverage > 0.0 {
                blend(canvas, x, y, color, coverage);
            }
        }
    }
}

fn draw_icon(canvas: &mut RgbaImage, icon: &RgbaImage, center: Point, diameter: f32) {
    let size = diameter.round().max(1.0) as u32;
    let scaled = image::imageops::resize(icon, size, size, FilterType::Triangle);

    let left = (center.x - size as f32 / 2.0).round() as i64;
    let top = (center.y - size as f32 / 2.0).round() as i64;

    for (ix, iy, px) in scaled.enumerate_pixels() {
        let x = left + ix as i64;
        let y = top + iy as i64;
        if x < 0 || y < 0 || x >= canvas.width() as i64 || y >= canvas.height() as i64 {
            continue;
        }
        let [r, g, b, a] = px.0;
        let color = Color::rgba(r, g, b, a as f32 / 255.0);
        blend(canvas, x as u32, y as u32, color, 1.0);
    }
}

/// Bitmap text centered on `center`, glyphs `height` pixels tall with one
/// column of spacing between characters.
fn draw_text(canvas: &mut RgbaImage, text: &str, center: Point, height: f32, color: Color) {
    let glyphs: Vec<[u8; GLYPH_HEIGHT]> = text.chars().map(font::glyph).collect();
    if glyphs.is_empty() {
        return;
    }

    let cell = height / GLYPH_HEIGHT as f32;
    let advance = GLYPH_WIDTH + 1;
    let columns = glyphs.len() * advance - 1;
    let left = center.x - columns as f32 * cell / 2.0;
    let top = center.y - height / 2.0;

    let xs = span(left, left + columns as f32 * cell, canvas.width());
    let ys = span(top, top + height, canvas.height());

    for y in ys {
        let gy = ((y as f32 + 0.5 - top) / cell).floor();
        if gy < 0.0 {
            continue;
        }
        for x in xs.clone() {
            let gx = ((x as f32 + 0.5 - left) / cell).floor();
            if gx < 0.0 {
                continue;
            }
            let (gx, gy) = (gx as usize, gy as usize);
            let Some(rows) = glyphs.get(gx / advance) else {
                continue;
            };
            if font::is_set(rows, gx % advance, gy) {
                blend(canvas, x, y, color, 1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Icon;
    use image::Rgba;
    use std::sync::Arc;

    fn base(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90, 255])
        })
    }

    fn marker(target: Point, usage: f32, icon: Option<Icon>) -> MarkerLayout {
        MarkerLayout {
            identifier: "rust".into(),
            display_name: "Rust".into(),
            usage_percent: usage,
            target,
            anchor: Point::new(250.0, 300.0),
            scale_factor: 1.0,
            icon,
            marker_diameter: 50.0,
        }
    }

    #[test]
    fn test_no_markers_reproduces_base() {
        let img = base(120, 80);
        let mut compositor = Compositor::new();
        compositor.render(&img, &[]);
        assert_eq!(compositor.surface().pixels().as_raw(), img.as_raw());
        assert_eq!(compositor.markers_drawn(), 0);
    }

    #[test]
    fn test_render_is_idempotent() {
        let img = base(500, 500);
        let icon: Icon = Arc::new(RgbaImage::from_pixel(8, 8, Rgba([10, 200, 30, 255])));
        let markers = vec![
            marker(Point::new(125.0, 50.0), 60.0, Some(icon)),
            marker(Point::new(250.0, 50.0), 25.0, None),
            marker(Point::new(375.0, 50.0), 15.0, None),
        ];

        let mut compositor = Compositor::new();
        compositor.render(&img, &markers);
        let first = compositor.surface().pixels().clone();
        compositor.render(&img, &markers);
        assert_eq!(compositor.surface().pixels().as_raw(), first.as_raw());
        assert_ne!(first.as_raw(), img.as_raw());
    }

    #[test]
    fn test_surface_follows_base_dimensions() {
        let mut compositor = Compositor::new();
        compositor.render(&base(300, 200), &[]);
        compositor.render(&base(64, 48), &[]);
        assert_eq!((compositor.surface().width(), compositor.surface().height()), (64, 48));
    }

    #[test]
    fn test_connector_is_red_midway() {
        let img = RgbaImage::from_pixel(500, 500, Rgba([255, 255, 255, 255]));
        let mut compositor = Compositor::new();
        compositor.render(&img, &[marker(Point::new(250.0, 50.0), 100.0, None)]);

        let px = compositor.surface().pixels().get_pixel(250, 175).0;
        assert!(px[0] > px[1] + 100, "expected red stroke, got {px:?}");
        assert!(px[0] > px[2] + 100, "expected red stroke, got {px:?}");
    }

    #[test]
    fn test_icon_marker_draws_icon_and_backing() {
        let img = RgbaImage::from_pixel(500, 500, Rgba([0, 0, 0, 255]));
        let icon: Icon = Arc::new(RgbaImage::from_pixel(16, 16, Rgba([10, 200, 30, 255])));
        let mut compositor = Compositor::new();
        compositor.render(&img, &[marker(Point::new(250.0, 60.0), 50.0, Some(icon))]);
        let surface = compositor.surface().pixels();

        assert_eq!(surface.get_pixel(250, 60).0, [10, 200, 30, 255]);
        // Between the icon edge (r=25) and the backing edge (r=28).
        assert_eq!(surface.get_pixel(250, 60 - 27).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_fallback_marker_is_blue_with_white_initials() {
        let img = RgbaImage::from_pixel(500, 500, Rgba([0, 0, 0, 255]));
        let mut compositor = Compositor::new();
        compositor.render(&img, &[marker(Point::new(250.0, 60.0), 50.0, None)]);
        let surface = compositor.surface().pixels();

        assert_eq!(surface.get_pixel(250, 60 - 20).0, [0x3B, 0x82, 0xF6, 255]);

        let white = (230..270)
            .flat_map(|x| (50..70).map(move |y| (x, y)))
            .filter(|&(x, y)| surface.get_pixel(x, y).0 == [255, 255, 255, 255])
            .count();
        assert!(white > 20, "expected initials inside the disc, found {white} white pixels");
    }

    #[test]
    fn test_later_markers_draw_over_earlier() {
        let img = RgbaImage::from_pixel(500, 500, Rgba([0, 0, 0, 255]));
        let icon: Icon = Arc::new(RgbaImage::from_pixel(16, 16, Rgba([10, 200, 30, 255])));
        let center = Point::new(250.0, 60.0);

        let mut compositor = Compositor::new();
        compositor.render(&img, &[marker(center, 50.0, None), marker(center, 50.0, Some(icon))]);
        assert_eq!(compositor.surface().pixels().get_pixel(250, 60).0, [10, 200, 30, 255]);
    }

    #[test]
    fn test_markers_clip_at_image_edge() {
        let img = base(40, 40);
        let mut compositor = Compositor::new();
        compositor.render(&img, &[marker(Point::new(0.0, 0.0), 100.0, None)]);
        assert_eq!(compositor.surface().width(), 40);
    }

    #[test]
    fn test_unbounded_usage_keeps_stroke_within_ceiling() {
        let img = base(500, 500);
        let mut compositor = Compositor::new();
        compositor.render(&img, &[marker(Point::new(250.0, 50.0), f32::INFINITY, None)]);

        let out = compositor.surface().pixels();
        assert_eq!(out.get_pixel(0, 499), img.get_pixel(0, 499));
        assert_eq!(out.get_pixel(499, 499), img.get_pixel(499, 499));
        // Ceiling is 6px wide, so 20px beside the line is untouched.
        assert_eq!(out.get_pixel(230, 200), img.get_pixel(230, 200));
    }
}
