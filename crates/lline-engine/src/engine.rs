use image::RgbImage;
use lline_core::detector::DetectorError;
use lline_core::{FaceDetector, FaceRegion, ScrfdDetector};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Detect {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<FaceRegion>, DetectorError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run face detection on the engine thread.
    pub async fn detect(&self, image: RgbImage) -> Result<Vec<FaceRegion>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Load the SCRFD model and start the engine. Fails fast if the model is missing.
pub fn spawn_scrfd(model_path: &str) -> Result<EngineHandle, EngineError> {
    let detector = ScrfdDetector::load(model_path)?;
    tracing::info!(path = model_path, "SCRFD detector loaded");
    spawn_engine(Box::new(detector))
}

/// Spawn the engine on a dedicated OS thread.
///
/// The detector is owned by that thread for its whole life; ONNX sessions
/// need exclusive access, so requests are serialized through a channel.
pub fn spawn_engine(mut detector: Box<dyn FaceDetector>) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("lline-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect { image, reply } => {
                        let result = detector.detect(&image);
                        if let Ok(faces) = &result {
                            tracing::debug!(
                                faces = faces.len(),
                                width = image.width(),
                                height = image.height(),
                                "detection finished"
                            );
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
