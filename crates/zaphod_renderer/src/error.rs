//! Error types for scene assembly and rendering.

use thiserror::Error;
use zaphod_core::HierarchyError;

/// Errors raised while assembling or re-timing a scene.
#[derive(Debug, Error, PartialEq)]
pub enum SceneError {
    #[error("object {index} ({name:?}) has an invalid parent: {source}")]
    InvalidParent {
        index: usize,
        name: String,
        #[source]
        source: HierarchyError,
    },

    #[error("transform hierarchy: {0}")]
    Hierarchy(#[from] HierarchyError),
}

/// Errors surfaced by the tile scheduler.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid render configuration: {0}")]
    InvalidConfig(String),

    /// The scene is shared outside the scheduler and cannot be re-timed.
    #[error("scene is still referenced elsewhere and cannot be updated")]
    SceneBusy,

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
