//! Error types for downcast conversion
//!
//! Only converter configuration mistakes are errors. Things like a value that
//! was already consumed are normal outcomes and never show up here.

use scribe_model::ModelError;
use scribe_view::ViewError;
use thiserror::Error;

pub type ConversionResult<T> = Result<T, ConversionError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Model child {index} of <{element}> matches more than one slot")]
    SlotFilterOverlap { element: String, index: usize },

    #[error("Model child {index} of <{element}> does not match any slot")]
    SlotFilterIncomplete { element: String, index: usize },

    #[error("Unknown slot mode: {0}")]
    SlotModeUnknown(String),

    #[error("Attribute `{key}` cannot be converted to a view attribute on a text node")]
    AttributeToAttributeOnText { key: String },

    #[error("<{element}> allows text and cannot be converted to a structure")]
    ElementToStructureDisallowedText { element: String },

    #[error("Model element {0} has no view element")]
    MissingViewElement(String),

    #[error("Cannot map model position {0} to the view")]
    UnmappedPosition(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    View(#[from] ViewError),
}
