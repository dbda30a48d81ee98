use scribe_model::{BatchId, BatchOrigin, BatchType, Model};
use tracing::instrument;

use crate::base_command::{operations_after, restore_selection, reverse_batch, BaseCommand};
use crate::error::UndoResult;

/// Undoing `batch` created `undoing_batch`. Redo stores the latter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revert {
    pub batch: BatchId,
    pub undoing_batch: BatchId,
}

#[derive(Debug, Default)]
pub struct UndoCommand {
    pub base: BaseCommand,
}

impl UndoCommand {
    pub fn new(base: BaseCommand) -> Self {
        Self { base }
    }

    pub fn is_enabled(&self) -> bool {
        self.base.is_enabled()
    }

    /// Undoes the latest batch, or `batch` from anywhere in the stack.
    /// Returns `None` when there is nothing to undo.
    #[instrument(skip(self, model))]
    pub fn execute(&mut self, model: &mut Model, batch: Option<BatchId>) -> UndoResult<Option<Revert>> {
        let Some(entry) = self.base.take(batch)? else {
            return Ok(None);
        };
        let batch_type = BatchType {
            is_undoable: true,
            origin: BatchOrigin::FromUndo,
        };
        let undoing_batch = model.change(batch_type, |writer| {
            reverse_batch(writer, entry.batch)?;
            let original = writer
                .model()
                .batch(entry.batch)
                .map(|batch| batch.operations().to_vec())
                .unwrap_or_default();
            let window = operations_after(writer.document(), &original);
            restore_selection(writer, &entry.selection, &window);
            Ok(writer.batch())
        })?;
        Ok(Some(Revert {
            batch: entry.batch,
            undoing_batch,
        }))
    }
}
