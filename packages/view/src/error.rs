//! Error types for the view layer

use thiserror::Error;

use crate::node::ViewNodeId;

pub type ViewResult<T> = Result<T, ViewError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("View node not found: {0}")]
    NodeNotFound(ViewNodeId),

    #[error("View root not found: {0}")]
    RootNotFound(String),

    #[error("Invalid view position: offset {offset} in {parent}")]
    InvalidPosition { parent: ViewNodeId, offset: usize },

    #[error("View range must start and end in the same parent")]
    RangeNotFlat,

    #[error("View node {0} is not attached to a root")]
    Detached(ViewNodeId),
}
