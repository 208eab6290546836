//! Anchor extraction: one origin point near the top of the head.
//!
//! Only the eye keypoints and the box height are used. The head top is
//! extrapolated straight up from the eye midpoint.

use crate::types::{FaceRegion, KeypointRole, Point};

/// Fraction of the face box height between the eye line and the head top.
const HEAD_TOP_OFFSET: f32 = 0.4;

/// Origin shared by every connector line of one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor(Point);

impl Anchor {
    /// Derive the anchor from a detected face.
    ///
    /// Eyes are looked up by role; untagged detections fall back to keypoints
    /// 1 (left) and 0 (right). Returns `None` when neither is possible.
    pub fn from_face(face: &FaceRegion) -> Option<Self> {
        let left = face
            .keypoint(KeypointRole::LeftEye)
            .or_else(|| face.keypoints.get(1))?;
        let right = face
            .keypoint(KeypointRole::RightEye)
            .or_else(|| face.keypoints.get(0))?;

        let eyes = left.position().midpoint(right.position());
        let y = (eyes.y - face.bbox.height * HEAD_TOP_OFFSET).max(0.0);

        Some(Self(Point::new(eyes.x, y)))
    }

    pub fn point(&self) -> Point {
        self.0
    }
}
