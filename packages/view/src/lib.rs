//! # Scribe View
//!
//! The rendered side of the editor: a mutable tree of container, attribute,
//! empty, UI and text nodes, plus the writer converters use to change it.

pub mod document;
pub mod error;
pub mod node;
pub mod stringify;
pub mod writer;

pub use document::{
    AddHighlightFn, HighlightHandler, RemoveHighlightFn, ViewDocument, ViewPosition, ViewRange,
    ViewSelection,
};
pub use error::{ViewError, ViewResult};
pub use node::{
    parse_styles, HighlightDescriptor, ViewAttributes, ViewNode, ViewNodeId, ViewNodeKind,
    DEFAULT_PRIORITY,
};
pub use stringify::stringify;
pub use writer::DowncastWriter;
