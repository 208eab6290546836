//! lline-core — positioning and rendering engine for L-Line portraits.
//!
//! A detected face yields a single anchor near the top of the head; the layout
//! engine spreads one marker per language across the top of the image; the
//! compositor draws connector lines and markers over the photo; the exporter
//! encodes the result.

pub mod anchor;
pub mod detector;
pub mod export;
pub mod font;
pub mod icon;
pub mod layout;
pub mod render;
pub mod types;

pub use anchor::Anchor;
pub use detector::{DetectorError, FaceDetector, FixedDetector, ScrfdDetector};
pub use export::{ExportError, ExportFormat, ExportedImage, Exporter};
pub use icon::{IconError, IconResolver, NoIcons};
pub use layout::LayoutEngine;
pub use render::{Compositor, RenderSurface};
pub use types::{BoundingBox, FaceRegion, Icon, Keypoint, KeypointRole, LanguageEntry, MarkerLayout, Point};

use std::path::PathBuf;

/// Default directory for ONNX model files.
pub fn default_model_dir() -> PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_dir.join("lline/models")
}
