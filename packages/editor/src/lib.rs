//! # Scribe Editor
//!
//! Wires the model, the view, downcast conversion and undo into one editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: change blocks → operations, batches  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor                                      │
//! │  - routes batches to the undo stacks        │
//! │  - runs undo and redo commands              │
//! │  - converts differ changes to the view      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ view: elements, attribute wrappers, markers │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scribe_editor::{Editor, EditorConfig};
//!
//! let mut editor = Editor::new(EditorConfig::default())?;
//! editor.conversion().element_to_element(ElementToElement::new("paragraph", "p"));
//!
//! editor.change(|writer| writer.insert_text("foo", Attributes::new(), &position))?;
//! assert_eq!(editor.get_data("main")?, "<p>foo</p>");
//!
//! editor.execute("undo", None)?;
//! ```

pub mod config;
pub mod editor;
pub mod errors;

pub use config::{ConversionConfig, EditorConfig, UndoConfig};
pub use editor::{Editor, REDO, UNDO};
pub use errors::{EditorError, EditorResult};
