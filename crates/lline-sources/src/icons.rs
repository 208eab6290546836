//! CDN-backed icon resolver with an optional on-disk cache.
//!
//! The devicon CDN serves SVG; those are rasterized with `resvg`. Raster
//! formats go straight through `image`.

use crate::catalog;
use async_trait::async_trait;
use image::RgbaImage;
use lline_core::{Icon, IconError, IconResolver};
use reqwest::Client;
use resvg::tiny_skia::{Pixmap, Transform};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_ICON_BASE_URL: &str = "https://cdn.jsdelivr.net/gh/devicons/devicon/icons";
pub const DEFAULT_ICON_EXTENSION: &str = "svg";
/// Edge length SVG icons are rasterized at; the compositor scales from here.
pub const SVG_RASTER_SIZE: u32 = 256;
pub const DEFAULT_ICON_VARIANT: &str = "original";

#[derive(Debug, Clone)]
pub struct IconSourceConfig {
    /// URL prefix; icons live at `<base>/<name>/<name>-<variant>.<ext>`.
    pub base_url: String,
    /// `svg`, or any raster format the `image` crate decodes.
    pub extension: String,
    pub default_variant: String,
    pub cache_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for IconSourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ICON_BASE_URL.to_string(),
            extension: DEFAULT_ICON_EXTENSION.to_string(),
            default_variant: DEFAULT_ICON_VARIANT.to_string(),
            cache_dir: None,
            timeout: Duration::from_secs(15),
        }
    }
}

pub struct CdnIconResolver {
    client: Client,
    config: IconSourceConfig,
}

impl CdnIconResolver {
    pub fn new(config: IconSourceConfig) -> Result<Self, IconError> {
        let client = Client::builder()
            .user_agent(concat!("lline/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| IconError::Fetch(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn icon_url(&self, name: &str, variant: &str) -> String {
        format!(
            "{}/{name}/{name}-{variant}.{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.extension
        )
    }

    fn cache_path(&self, name: &str, variant: &str) -> Option<PathBuf> {
        self.config
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{name}-{variant}.{}", self.config.extension)))
    }

    async fn read_cached(&self, path: &PathBuf) -> Option<Icon> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "icon cache read failed");
                return None;
            }
        };
        match decode(&bytes) {
            Ok(icon) => Some(icon),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable cached icon");
                None
            }
        }
    }

    async fn write_cached(&self, path: &PathBuf, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(dir = %parent.display(), error = %e, "cannot create icon cache dir");
                return;
            }
        }
        if let Err(e) = tokio::fs::write(path, bytes).await {
            tracing::warn!(path = %path.display(), error = %e, "icon cache write failed");
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IconError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IconError::Fetch(e.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|e| IconError::Fetch(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| IconError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl IconResolver for CdnIconResolver {
    async fn resolve(&self, identifier: &str, variant: Option<&str>) -> Result<Icon, IconError> {
        let entry = catalog::lookup(identifier)
            .ok_or_else(|| IconError::UnknownLanguage(identifier.to_string()))?;
        let preferred = variant.unwrap_or(&self.config.default_variant);
        let variant = entry
            .pick_variant(preferred)
            .ok_or_else(|| IconError::UnknownLanguage(identifier.to_string()))?;

        let cache_path = self.cache_path(&entry.name, variant);
        if let Some(path) = &cache_path {
            if let Some(icon) = self.read_cached(path).await {
                tracing::debug!(identifier, path = %path.display(), "icon cache hit");
                return Ok(icon);
            }
        }

        let url = self.icon_url(&entry.name, variant);
        tracing::debug!(identifier, %url, "fetching icon");
        let bytes = self.fetch(&url).await?;
        let icon = decode(&bytes)?;

        if let Some(path) = &cache_path {
            self.write_cached(path, &bytes).await;
        }
        Ok(icon)
    }
}

fn decode(bytes: &[u8]) -> Result<Icon, IconError> {
    if looks_like_svg(bytes) {
        return rasterize_svg(bytes, SVG_RASTER_SIZE).map(Arc::new);
    }
    image::load_from_memory(bytes)
        .map(|img| Arc::new(img.into_rgba8()))
        .map_err(|e| IconError::Decode(e.to_string()))
}

/// SVG is XML text: after an optional BOM and whitespace it starts with `<`.
fn looks_like_svg(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}

/// Render an SVG document into a `size`×`size` RGBA bitmap, aspect preserved
/// and centered.
fn rasterize_svg(bytes: &[u8], size: u32) -> Result<RgbaImage, IconError> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
        .map_err(|e| IconError::Decode(format!("svg: {e}")))?;

    let (w, h) = (tree.size().width(), tree.size().height());
    let scale = size as f32 / w.max(h);
    let dx = (size as f32 - w * scale) / 2.0;
    let dy = (size as f32 - h * scale) / 2.0;

    let mut pixmap = Pixmap::new(size, size)
        .ok_or_else(|| IconError::Decode("svg: cannot allocate pixmap".to_string()))?;
    let transform = Transform::from_row(scale, 0.0, 0.0, scale, dx, dy);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha.
    let rgba: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|px| {
            let c = px.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RgbaImage::from_raw(size, size, rgba)
        .ok_or_else(|| IconError::Decode("svg: pixel buffer size mismatch".to_string()))
}
