//! Error types for scene editing.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The scene already holds the maximum number of objects.
    #[error("Scene is full ({0} objects)")]
    Full(usize),

    /// No object at the given index.
    #[error("No scene object at index {0}")]
    NoSuchObject(usize),
}

/// Result type alias for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
