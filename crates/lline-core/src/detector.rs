//! Face detection collaborator: the `FaceDetector` trait and an SCRFD
//! implementation running on ONNX Runtime.
//!
//! SCRFD is anchor-free with three strides. Each stride yields scores, box
//! distances and five keypoint offsets per anchor cell; we decode all three,
//! map them back out of the letterbox and suppress overlaps.

use crate::types::{BoundingBox, FaceRegion, Keypoint, KeypointRole};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// SCRFD keypoint order.
const KEYPOINT_ROLES: [KeypointRole; 5] = [
    KeypointRole::LeftEye,
    KeypointRole::RightEye,
    KeypointRole::NoseTip,
    KeypointRole::MouthLeft,
    KeypointRole::MouthRight,
];

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download det_10g.onnx from insightface")]
    ModelNotFound(String),
    #[error("unexpected model layout: {0}")]
    ModelLayout(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Returns every face found in an RGB image, best first.
pub trait FaceDetector: Send {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>, DetectorError>;
}

/// Detector that returns a preset answer; used when the face is supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct FixedDetector {
    faces: Vec<FaceRegion>,
}

impl FixedDetector {
    pub fn new(faces: Vec<FaceRegion>) -> Self {
        Self { faces }
    }
}

impl FaceDetector for FixedDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<FaceRegion>, DetectorError> {
        Ok(self.faces.clone())
    }
}

/// Maps letterboxed model coordinates back to source pixels.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let (w, h) = scaled_dims(width, height, scale);
        Self {
            scale,
            pad_x: ((INPUT_SIZE - w) / 2) as f32,
            pad_y: ((INPUT_SIZE - h) / 2) as f32,
        }
    }

    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

fn scaled_dims(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let h = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    (w, h)
}

/// Positions of one stride's (scores, boxes, keypoints) tensors in the model outputs.
type StrideOutputs = (usize, usize, usize);

/// SCRFD detector (`det_10g.onnx`).
pub struct ScrfdDetector {
    session: Session,
    outputs: [StrideOutputs; 3],
}

impl ScrfdDetector {
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(DetectorError::ModelLayout(format!(
                "expected 9 outputs (3 strides × score/bbox/kps), found {}",
                names.len()
            )));
        }
        let outputs = map_outputs(&names);

        tracing::info!(path = model_path, outputs = ?names, mapping = ?outputs, "loaded SCRFD model");

        Ok(Self { session, outputs })
    }

    fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
        let letterbox = Letterbox::fit(image.width(), image.height());
        let (w, h) = scaled_dims(image.width(), image.height(), letterbox.scale);
        let resized = image::imageops::resize(image, w, h, FilterType::Triangle);

        let size = INPUT_SIZE as usize;
        // Padding stays at 0.0, which is the normalized mean.
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        let (ox, oy) = (letterbox.pad_x as usize, letterbox.pad_y as usize);

        for (x, y, px) in resized.enumerate_pixels() {
            let (tx, ty) = (ox + x as usize, oy + y as usize);
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = (px.0[c] as f32 - PIXEL_MEAN) / PIXEL_STD;
            }
        }

        (tensor, letterbox)
    }
}

impl FaceDetector for ScrfdDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = Self::preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.outputs[slot];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let scores = extract(score_idx, "scores")?;
            let boxes = extract(bbox_idx, "boxes")?;
            let kps = extract(kps_idx, "keypoints")?;

            candidates.extend(decode_stride(scores, boxes, kps, stride, &letterbox));
        }

        let faces = suppress_overlaps(candidates, NMS_IOU_THRESHOLD);
        tracing::debug!(faces = faces.len(), "SCRFD detection finished");
        Ok(faces)
    }
}

/// Map output tensors to strides by name (`score_8`, `bbox_16`, ...), falling back
/// to the export's positional order of scores, then boxes, then keypoints.
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let by_name: Option<Vec<StrideOutputs>> = STRIDES
        .iter()
        .map(|&s| Some((position("score", s)?, position("bbox", s)?, position("kps", s)?)))
        .collect();

    match by_name {
        Some(found) => [found[0], found[1], found[2]],
        None => [(0, 3, 6), (1, 4, 7), (2, 5, 8)],
    }
}

fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<FaceRegion> {
    let cells_x = INPUT_SIZE as usize / stride;
    let cells_y = INPUT_SIZE as usize / stride;
    let step = stride as f32;

    let mut faces = Vec::new();
    for idx in 0..cells_x * cells_y * ANCHORS_PER_CELL {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= SCORE_THRESHOLD {
            continue;
        }
        let (Some(dist), Some(offsets)) = (boxes.get(idx * 4..idx * 4 + 4), kps.get(idx * 10..idx * 10 + 10)) else {
            continue;
        };

        let cell = idx / ANCHORS_PER_CELL;
        let cx = (cell % cells_x) as f32 * step;
        let cy = (cell / cells_x) as f32 * step;

        let (x1, y1) = letterbox.unmap(cx - dist[0] * step, cy - dist[1] * step);
        let (x2, y2) = letterbox.unmap(cx + dist[2] * step, cy + dist[3] * step);

        let keypoints = KEYPOINT_ROLES
            .iter()
            .enumerate()
            .map(|(k, &role)| {
                let (x, y) = letterbox.unmap(cx + offsets[k * 2] * step, cy + offsets[k * 2 + 1] * step);
                Keypoint { x, y, role: Some(role) }
            })
            .collect();

        faces.push(FaceRegion {
            bbox: BoundingBox { x: x1, y: y1, width: x2 - x1, height: y2 - y1 },
            keypoints,
            confidence: score,
        });
    }
    faces
}

/// Greedy non-maximum suppression; the result is sorted by confidence.
fn suppress_overlaps(mut faces: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<FaceRegion> = Vec::new();
    for face in faces {
        if kept.iter().all(|k| k.bbox.iou(&face.bbox) <= iou_threshold) {
            kept.push(face);
        }
    }
    kept
}
