use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A point in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Axis-aligned face bounding box in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, 0.0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let inter = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Semantic role of a facial keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeypointRole {
    LeftEye,
    RightEye,
    NoseTip,
    MouthLeft,
    MouthRight,
}

/// A facial keypoint, optionally tagged with its role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<KeypointRole>,
}

impl Keypoint {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// One detected face: bounding box plus keypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub keypoints: Vec<Keypoint>,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl FaceRegion {
    /// First keypoint carrying the given role.
    pub fn keypoint(&self, role: KeypointRole) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.role == Some(role))
    }
}

/// A language and its share of the user's code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageEntry {
    /// Stable lowercase key, e.g. "rust".
    pub identifier: String,
    pub display_name: String,
    /// Usage share in percent, 0–100.
    pub usage_percent: f32,
}

impl LanguageEntry {
    pub fn new(identifier: impl Into<String>, display_name: impl Into<String>, usage_percent: f32) -> Self {
        Self {
            identifier: identifier.into().to_lowercase(),
            display_name: display_name.into(),
            usage_percent,
        }
    }
}

/// Decoded icon bitmap shared between the layout and the renderer.
pub type Icon = Arc<RgbaImage>;

/// Placement and visual payload for one language marker.
#[derive(Debug, Clone)]
pub struct MarkerLayout {
    pub identifier: String,
    pub display_name: String,
    pub usage_percent: f32,
    pub target: Point,
    pub anchor: Point,
    pub scale_factor: f32,
    pub icon: Option<Icon>,
    pub marker_diameter: f32,
}

impl MarkerLayout {
    /// Connector stroke width: floors at `2×scale` and reaches `6×scale` at 100% usage.
    pub fn line_width(&self) -> f32 {
        line_width(self.usage_percent, self.scale_factor)
    }
}

/// Usage outside 0–100 is clamped; NaN counts as 0.
pub fn line_width(usage_percent: f32, scale_factor: f32) -> f32 {
    let usage = if usage_percent.is_nan() {
        0.0
    } else {
        usage_percent.clamp(0.0, 100.0)
    };
    let floor = 2.0 * scale_factor;
    let ceiling = 6.0 * scale_factor;
    floor.max(usage / 100.0 * ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h }
    }

    #[test]
    fn test_line_width_bounds() {
        assert_eq!(line_width(0.0, 1.0), 2.0);
        assert_eq!(line_width(100.0, 1.0), 6.0);
        assert_eq!(line_width(100.0, 1.6), 6.0 * 1.6);
    }

    #[test]
    fn test_line_width_clamps_out_of_range_usage() {
        assert_eq!(line_width(500.0, 0.4), 6.0 * 0.4);
        assert_eq!(line_width(f32::INFINITY, 1.0), 6.0);
        assert_eq!(line_width(-3.0, 1.0), 2.0);
        assert_eq!(line_width(f32::NAN, 1.0), 2.0);
    }

    #[test]
    fn test_line_width_monotonic() {
        let mut prev = 0.0f32;
        for pct in 0..=100 {
            let w = line_width(pct as f32, 1.3);
            assert!(w >= prev, "width dropped at {pct}%");
            prev = w;
        }
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(5.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&bbox(20.0, 20.0, 5.0, 5.0)), 0.0);
    }

    #[test]
    fn test_face_region_json_shape() {
        let json = r#"{
            "box": {"x": 10, "y": 20, "width": 100, "height": 120},
            "keypoints": [
                {"x": 40, "y": 60, "role": "rightEye"},
                {"x": 80, "y": 60, "role": "leftEye"},
                {"x": 60, "y": 80}
            ]
        }"#;
        let face: FaceRegion = serde_json::from_str(json).unwrap();
        assert_eq!(face.confidence, 1.0);
        assert_eq!(face.keypoint(KeypointRole::LeftEye).unwrap().x, 80.0);
        assert!(face.keypoints[2].role.is_none());
    }

    #[test]
    fn test_language_entry_lowercases_identifier() {
        let entry = LanguageEntry::new("TypeScript", "TypeScript", 12.0);
        assert_eq!(entry.identifier, "typescript");
        assert_eq!(entry.display_name, "TypeScript");
    }
}
