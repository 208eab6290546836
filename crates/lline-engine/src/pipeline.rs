//! Render pipeline: statistics and face detection run concurrently, join in
//! the layout engine, and the result is committed to the session's surface
//! only if no newer request has started in the meantime.

use crate::engine::{EngineError, EngineHandle};
use chrono::NaiveDate;
use image::{DynamicImage, RgbaImage};
use lline_core::detector::DetectorError;
use lline_core::{
    Anchor, Compositor, ExportError, ExportedImage, Exporter, FaceRegion, IconResolver,
    LanguageEntry, LayoutEngine, MarkerLayout,
};
use lline_sources::LanguageStatsSource;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no face detected in the photo")]
    NoFaceDetected,
    #[error("{0} faces detected; the photo must show exactly one")]
    MultipleFacesDetected(usize),
    #[error("language statistics unavailable: {0}")]
    StatisticsUnavailable(String),
    #[error("cannot decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("no face detector configured and no face supplied")]
    DetectorUnavailable,
    #[error("engine thread exited")]
    EngineClosed,
    #[error("nothing to export: the latest request has not been rendered")]
    NothingCommitted,
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

impl From<EngineError> for PipelineError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Detector(d) => Self::Detector(d),
            EngineError::Spawn(_) | EngineError::ChannelClosed => Self::EngineClosed,
        }
    }
}

/// Decoded photo at its natural size.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: RgbaImage,
    pub width: u32,
    pub height: u32,
}

pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, PipelineError> {
    let pixels = image::load_from_memory(bytes)?.into_rgba8();
    let (width, height) = pixels.dimensions();
    Ok(DecodedImage {
        pixels,
        width,
        height,
    })
}

/// The layout needs exactly one face.
pub fn select_single_face(mut faces: Vec<FaceRegion>) -> Result<FaceRegion, PipelineError> {
    match faces.len() {
        0 => Err(PipelineError::NoFaceDetected),
        1 => Ok(faces.remove(0)),
        n => Err(PipelineError::MultipleFacesDetected(n)),
    }
}

/// Where a request's languages come from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LanguageInput {
    User(String),
    Entries(Vec<LanguageEntry>),
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub image: Arc<[u8]>,
    /// Skips detection when set.
    pub face: Option<FaceRegion>,
    pub languages: LanguageInput,
}

/// Fingerprint of a request's inputs (image bytes, face, languages).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotId([u8; 32]);

impl SnapshotId {
    pub fn of(request: &RenderRequest) -> Self {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, &request.image);
        hash_field(&mut hasher, &serde_json::to_vec(&request.face).unwrap_or_default());
        hash_field(&mut hasher, &serde_json::to_vec(&request.languages).unwrap_or_default());
        Self(hasher.finalize().into())
    }
}

fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..6] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({self})")
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub snapshot: SnapshotId,
    /// False when a newer request started before this one finished.
    pub committed: bool,
    pub face: FaceRegion,
    pub anchor: Option<Anchor>,
    pub languages: Vec<LanguageEntry>,
    pub markers: Vec<MarkerLayout>,
}

struct SessionState {
    current: Option<SnapshotId>,
    committed: Option<SnapshotId>,
    compositor: Compositor,
}

/// Owns the render surface and decides which result gets to draw on it.
pub struct RenderSession {
    state: Mutex<SessionState>,
}

impl Default for RenderSession {
    fn default() -> Self {
        Self {
            state: Mutex::new(SessionState {
                current: None,
                committed: None,
                compositor: Compositor::new(),
            }),
        }
    }
}

impl RenderSession {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `snapshot` as the latest request; anything older becomes stale.
    pub fn begin(&self, snapshot: SnapshotId) {
        self.lock().current = Some(snapshot);
    }

    pub fn current(&self) -> Option<SnapshotId> {
        self.lock().current
    }

    pub fn committed(&self) -> Option<SnapshotId> {
        self.lock().committed
    }

    /// Draw the layout if `snapshot` is still current; otherwise discard it.
    pub fn commit(&self, snapshot: SnapshotId, base: &RgbaImage, markers: &[MarkerLayout]) -> bool {
        let mut state = self.lock();
        if state.current != Some(snapshot) {
            tracing::warn!(%snapshot, current = ?state.current, "discarding stale render");
            return false;
        }
        state.compositor.render(base, markers);
        state.committed = Some(snapshot);
        true
    }

    /// Encode the surface, but only if it belongs to the latest request.
    ///
    /// A failed or still running newer request leaves an older surface
    /// behind; that surface is never exported.
    pub fn export(&self, exporter: &Exporter, date: NaiveDate) -> Result<ExportedImage, PipelineError> {
        let state = self.lock();
        if state.committed.is_none() || state.committed != state.current {
            tracing::warn!(current = ?state.current, committed = ?state.committed, "refusing to export a superseded surface");
            return Err(PipelineError::NothingCommitted);
        }
        Ok(exporter.export(state.compositor.surface(), state.compositor.markers_drawn(), date)?)
    }

    /// Copy of the current surface pixels.
    pub fn pixels(&self) -> RgbaImage {
        self.lock().compositor.surface().pixels().clone()
    }
}

pub struct Pipeline {
    layout: LayoutEngine,
    exporter: Exporter,
    stats: Arc<dyn LanguageStatsSource>,
    icons: Arc<dyn IconResolver>,
    engine: Option<EngineHandle>,
    session: RenderSession,
}

impl Pipeline {
    pub fn new(
        layout: LayoutEngine,
        exporter: Exporter,
        stats: Arc<dyn LanguageStatsSource>,
        icons: Arc<dyn IconResolver>,
        engine: Option<EngineHandle>,
    ) -> Self {
        Self {
            layout,
            exporter,
            stats,
            icons,
            engine,
            session: RenderSession::default(),
        }
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    /// Run one request end to end and commit it if it is still current.
    pub async fn run(&self, request: RenderRequest) -> Result<RenderOutcome, PipelineError> {
        let snapshot = SnapshotId::of(&request);
        self.session.begin(snapshot);
        tracing::info!(%snapshot, "render started");

        let decoded = decode_image(&request.image)?;
        let (languages, face) = tokio::try_join!(
            self.resolve_languages(&request.languages),
            self.resolve_face(&decoded, request.face),
        )?;

        let anchor = Anchor::from_face(&face);
        if anchor.is_none() {
            tracing::warn!("face has no usable eye keypoints; rendering without markers");
        }

        let markers = self
            .layout
            .layout(
                decoded.width,
                decoded.height,
                anchor.as_ref(),
                &languages,
                self.icons.as_ref(),
            )
            .await;

        let committed = self.session.commit(snapshot, &decoded.pixels, &markers);
        if committed {
            tracing::info!(%snapshot, markers = markers.len(), "render committed");
        }

        Ok(RenderOutcome {
            snapshot,
            committed,
            face,
            anchor,
            languages,
            markers,
        })
    }

    /// Encode the committed surface, named for `date`.
    pub fn export(&self, date: NaiveDate) -> Result<ExportedImage, PipelineError> {
        self.session.export(&self.exporter, date)
    }

    async fn resolve_languages(&self, input: &LanguageInput) -> Result<Vec<LanguageEntry>, PipelineError> {
        match input {
            LanguageInput::Entries(entries) => Ok(entries.clone()),
            LanguageInput::User(user) => self
                .stats
                .fetch(user)
                .await
                .map_err(|e| PipelineError::StatisticsUnavailable(e.to_string())),
        }
    }

    async fn resolve_face(
        &self,
        decoded: &DecodedImage,
        supplied: Option<FaceRegion>,
    ) -> Result<FaceRegion, PipelineError> {
        if let Some(face) = supplied {
            return Ok(face);
        }
        let engine = self.engine.as_ref().ok_or(PipelineError::DetectorUnavailable)?;
        let rgb = DynamicImage::ImageRgba8(decoded.pixels.clone()).into_rgb8();
        let faces = engine.detect(rgb).await?;
        select_single_face(faces)
    }
}
