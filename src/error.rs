//! Crate error types

use crate::backend::BackendError;
use thiserror::Error;

/// Errors surfaced by scene construction and the frame pipeline
#[derive(Error, Debug)]
pub enum SceneError {
    /// A closed chain needs at least three links
    #[error("chain of {0} marbles cannot form a closed ring (minimum is 3)")]
    DegenerateChain(usize),

    /// A camera was created without any renderable layer
    #[error("camera '{0}' has an empty layer mask")]
    MissingLayerMask(String),

    /// Two targets that must stay in lockstep diverged in size
    #[error("target '{name}' is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    TargetSizeMismatch {
        name: String,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// A pass reads a target no earlier pass has written this frame
    #[error("pass '{pass}' reads target '{target}' before any pass writes it")]
    PipelineOrder { pass: String, target: String },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("texture error: {0}")]
    Texture(String),
}

pub type SceneResult<T> = Result<T, SceneError>;
