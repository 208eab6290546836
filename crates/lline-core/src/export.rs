//! Surface export: JPEG with a silent PNG fallback.

use crate::render::RenderSurface;
use chrono::NaiveDate;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("nothing to export: surface is empty")]
    EmptySurface,
    #[error("encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Jpeg,
    Png,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Encoded image ready to be saved.
#[derive(Debug, Clone)]
pub struct ExportedImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub format: ExportFormat,
}

/// Suggested download name, e.g. `l-line-2026-10-19-3langs.jpg`.
pub fn export_filename(date: NaiveDate, marker_count: usize, format: ExportFormat) -> String {
    format!(
        "l-line-{}-{marker_count}langs.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

#[derive(Debug, Clone)]
pub struct Exporter {
    quality: u8,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl Exporter {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Encode the surface as JPEG, or as PNG when JPEG cannot represent it.
    ///
    /// Only an empty surface or a failure of both encoders is an error.
    pub fn export(
        &self,
        surface: &RenderSurface,
        marker_count: usize,
        date: NaiveDate,
    ) -> Result<ExportedImage, ExportError> {
        let (width, height) = (surface.width(), surface.height());
        if width == 0 || height == 0 {
            return Err(ExportError::EmptySurface);
        }

        let (bytes, format) = match self.encode_jpeg(surface) {
            Ok(bytes) => (bytes, ExportFormat::Jpeg),
            Err(e) => {
                tracing::warn!(error = %e, width, height, "JPEG encoding failed; falling back to PNG");
                (encode_png(surface)?, ExportFormat::Png)
            }
        };

        let filename = export_filename(date, marker_count, format);
        tracing::info!(%filename, bytes = bytes.len(), "surface exported");

        Ok(ExportedImage {
            bytes,
            filename,
            format,
        })
    }

    fn encode_jpeg(&self, surface: &RenderSurface) -> Result<Vec<u8>, image::ImageError> {
        // JPEG has no alpha channel.
        let rgb = DynamicImage::ImageRgba8(surface.pixels().clone()).into_rgb8();
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.quality).write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(encoded)
    }
}

fn encode_png(surface: &RenderSurface) -> Result<Vec<u8>, image::ImageError> {
    let pixels = surface.pixels();
    let mut encoded = Vec::new();
    PngEncoder::new(&mut encoded).write_image(
        pixels.as_raw(),
        pixels.width(),
        pixels.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Compositor;
    use image::{Rgba, RgbaImage};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn surface_of(width: u32, height: u32) -> Compositor {
        let mut compositor = Compositor::new();
        compositor.render(&RgbaImage::from_pixel(width, height, Rgba([40, 80, 120, 255])), &[]);
        compositor
    }

    #[test]
    fn test_filename_format() {
        assert_eq!(export_filename(date(), 3, ExportFormat::Jpeg), "l-line-2026-10-19-3langs.jpg");
        assert_eq!(export_filename(date(), 0, ExportFormat::Png), "l-line-2026-10-19-0langs.png");
    }

    #[test]
    fn test_exports_jpeg() {
        let compositor = surface_of(64, 48);
        let out = Exporter::default().export(compositor.surface(), 4, date()).unwrap();
        assert_eq!(out.format, ExportFormat::Jpeg);
        assert_eq!(out.filename, "l-line-2026-10-19-4langs.jpg");
        assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_falls_back_to_png_when_jpeg_cannot_encode() {
        // Baseline JPEG cannot address more than 65535 columns.
        let compositor = surface_of(70_000, 1);
        let out = Exporter::default().export(compositor.surface(), 2, date()).unwrap();
        assert_eq!(out.format, ExportFormat::Png);
        assert_eq!(out.filename, "l-line-2026-10-19-2langs.png");
        assert_eq!(&out.bytes[1..4], b"PNG");
    }

    #[test]
    fn test_empty_surface_is_rejected() {
        let compositor = Compositor::new();
        assert!(matches!(
            Exporter::default().export(compositor.surface(), 0, date()),
            Err(ExportError::EmptySurface)
        ));
    }
}
