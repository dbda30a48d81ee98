//! Error types for the editor

use scribe_engine::ConversionError;
use scribe_model::ModelError;
use scribe_undo::UndoError;
use scribe_view::ViewError;
use thiserror::Error;

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Command is disabled: {0}")]
    CommandDisabled(String),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("View error: {0}")]
    View(#[from] ViewError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Undo error: {0}")]
    Undo(#[from] UndoError),
}
