//! # Scribe Undo
//!
//! Undo and redo for model batches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: change blocks → batches + history    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ undo editing: routes batches by origin      │
//! │  - fresh edits → undo stack, redo cleared   │
//! │  - redo batches → undo stack                │
//! │  - undo batches → redo stack (revert)       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ commands: reverse a batch, transformed by   │
//! │ later history, then restore the selection   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scribe_undo::UndoEditing;
//!
//! let mut editing = UndoEditing::new();
//! model.change(BatchType::DEFAULT, |writer| writer.insert_text("foo", attributes, &position))?;
//! editing.handle_applied(&mut model);
//!
//! editing.undo(&mut model, None)?;
//! editing.redo(&mut model, None)?;
//! ```

pub mod base_command;
pub mod error;
pub mod redo_command;
pub mod undo_command;
pub mod undo_editing;

pub use base_command::{normalize_ranges, restore_selection, reverse_batch, BaseCommand, StackEntry};
pub use error::{UndoError, UndoResult};
pub use redo_command::RedoCommand;
pub use undo_command::{Revert, UndoCommand};
pub use undo_editing::UndoEditing;
