//! lline-engine — wires the core engine to its collaborators.
//!
//! Face detection runs on a dedicated thread behind [`EngineHandle`]; the
//! [`Pipeline`] joins detection with language statistics and icon resolution
//! and commits results to a [`RenderSession`] unless they have gone stale.

pub mod config;
pub mod engine;
pub mod pipeline;

pub use config::Config;
pub use engine::{spawn_engine, spawn_scrfd, EngineError, EngineHandle};
pub use pipeline::{
    decode_image, select_single_face, DecodedImage, LanguageInput, Pipeline, PipelineError,
    RenderOutcome, RenderRequest, RenderSession, SnapshotId,
};
