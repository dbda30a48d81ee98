//! Error types for undo and redo

use scribe_model::{BatchId, ModelError};
use thiserror::Error;

pub type UndoResult<T> = Result<T, UndoError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UndoError {
    #[error("{0} is not on the stack")]
    BatchNotInStack(BatchId),

    #[error(transparent)]
    Model(#[from] ModelError),
}
