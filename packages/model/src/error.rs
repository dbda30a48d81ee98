//! Error types for the model layer

use thiserror::Error;

use crate::node::ElementId;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Root not found: {0}")]
    RootNotFound(String),

    #[error("Invalid path {path:?} in root '{root}': {reason}")]
    InvalidPath {
        root: String,
        path: Vec<usize>,
        reason: String,
    },

    #[error("Element not found: {0}")]
    ElementNotFound(ElementId),

    #[error("Batch not found: {0}")]
    BatchNotFound(u64),

    #[error("Operation base version {found:?} does not match document version {expected}")]
    VersionMismatch { expected: u64, found: Option<u64> },

    #[error("Range must be flat (start and end in the same parent)")]
    RangeNotFlat,

    #[error("Cannot move a range into itself")]
    MoveIntoItself,

    #[error("Expected element '{expected}' at rename position, found '{found}'")]
    RenameMismatch { expected: String, found: String },
}
