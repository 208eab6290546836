//! Icon resolution interface consumed by the layout engine.

use crate::types::Icon;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IconError {
    #[error("no icon known for {0}")]
    UnknownLanguage(String),
    #[error("icon fetch failed: {0}")]
    Fetch(String),
    #[error("icon decode failed: {0}")]
    Decode(String),
}

/// Resolves a language identifier to a decoded bitmap.
///
/// Implementations must tolerate many concurrent calls; each call is
/// independent and a failure only affects its own language.
#[async_trait]
pub trait IconResolver: Send + Sync {
    async fn resolve(&self, identifier: &str, variant: Option<&str>) -> Result<Icon, IconError>;
}

/// Resolver that never has an icon, so every marker renders as initials.
pub struct NoIcons;

#[async_trait]
impl IconResolver for NoIcons {
    async fn resolve(&self, identifier: &str, _variant: Option<&str>) -> Result<Icon, IconError> {
        Err(IconError::UnknownLanguage(identifier.to_string()))
    }
}
