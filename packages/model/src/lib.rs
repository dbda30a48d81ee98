//! # Scribe Model
//!
//! The document model: a tree of elements and text under named roots,
//! mutated only through reversible operations applied inside change blocks.
//! Operations are recorded in a history so they can be transformed and
//! undone later.

pub mod batch;
pub mod differ;
pub mod document;
pub mod error;
pub mod history;
pub mod markers;
pub mod model;
pub mod node;
pub mod operation;
pub mod position;
pub mod schema;
pub mod selection;
pub mod stringify;
pub mod transform;

pub use batch::{Batch, BatchId, BatchOrigin, BatchRegistry, BatchType};
pub use differ::{ChangeEntry, DiffSource, Differ, MarkerChange};
pub use document::{Document, Item, ROOT_NAME};
pub use error::{ModelError, ModelResult};
pub use history::History;
pub use markers::{Marker, Markers};
pub use model::{AppliedOperation, Model, Writer, FRAGMENT_ROOT};
pub use node::{Attributes, Element, ElementId, Node, Text, TEXT_NAME};
pub use operation::{Operation, OperationKind};
pub use position::{Position, Range, Stickiness, GRAVEYARD};
pub use schema::{Schema, SchemaItem};
pub use selection::{DocumentSelection, SelectionSnapshot};
pub use stringify::stringify;
pub use transform::{transform, transform_by_history, transform_range, TransformContext};
