//! # Undo editing
//!
//! Owns both commands and routes finished batches to them:
//!
//! | batch origin | undo stack | redo stack |
//! |--------------|------------|------------|
//! | `Fresh`      | push       | clear      |
//! | `FromRedo`   | push       | -          |
//! | `FromUndo`   | -          | via [`Revert`] |
//!
//! Non-undoable batches and operations outside the document are ignored.

use scribe_model::{AppliedOperation, BatchId, BatchOrigin, Model};
use tracing::debug;

use crate::base_command::BaseCommand;
use crate::error::UndoResult;
use crate::redo_command::RedoCommand;
use crate::undo_command::{Revert, UndoCommand};

#[derive(Debug, Default)]
pub struct UndoEditing {
    pub undo: UndoCommand,
    pub redo: RedoCommand,
    /// Newest batch routed so far. Batch ids only grow, so a batch with many
    /// operations, or one appended to later, is routed once.
    last_routed: Option<BatchId>,
}

impl UndoEditing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both stacks keep at most `step_limit` entries (0 = unlimited).
    pub fn with_step_limit(step_limit: usize) -> Self {
        Self {
            undo: UndoCommand::new(BaseCommand::with_step_limit(step_limit)),
            redo: RedoCommand::new(BaseCommand::with_step_limit(step_limit)),
            last_routed: None,
        }
    }

    pub fn handle_operation(&mut self, model: &Model, applied: &AppliedOperation) {
        if !applied.operation.is_document_operation()
            || self.last_routed.is_some_and(|last| applied.batch <= last)
        {
            return;
        }
        self.last_routed = Some(applied.batch);
        let Some(batch) = model.batch(applied.batch) else {
            return;
        };
        if !batch.is_undoable() {
            return;
        }
        match batch.origin() {
            BatchOrigin::FromRedo => self.undo.base.add_batch(batch.id(), model.document()),
            BatchOrigin::Fresh => {
                self.undo.base.add_batch(batch.id(), model.document());
                self.redo.base.clear_stack();
            }
            BatchOrigin::FromUndo => {}
        }
        debug!(batch = %batch.id(), origin = ?batch.origin(), "Routed batch");
    }

    /// Routes every operation applied since the last call.
    pub fn handle_applied(&mut self, model: &mut Model) {
        for applied in model.take_applied() {
            self.handle_operation(model, &applied);
        }
    }

    pub fn undo(&mut self, model: &mut Model, batch: Option<BatchId>) -> UndoResult<Option<Revert>> {
        let revert = self.undo.execute(model, batch)?;
        if let Some(revert) = revert {
            self.redo.base.add_batch(revert.undoing_batch, model.document());
        }
        self.handle_applied(model);
        Ok(revert)
    }

    pub fn redo(&mut self, model: &mut Model, batch: Option<BatchId>) -> UndoResult<Option<BatchId>> {
        let redone = self.redo.execute(model, batch)?;
        self.handle_applied(model);
        Ok(redone)
    }

    /// Drops both stacks, after content was replaced wholesale.
    pub fn clear(&mut self) {
        self.undo.base.clear_stack();
        self.redo.base.clear_stack();
    }
}
