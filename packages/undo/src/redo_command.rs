use scribe_model::{BatchId, BatchOrigin, BatchType, Model};
use tracing::instrument;

use crate::base_command::{operations_after, restore_selection, reverse_batch, BaseCommand};
use crate::error::UndoResult;

/// Stores undoing batches. Redoing one reverses it, which re-applies the
/// change it undid.
#[derive(Debug, Default)]
pub struct RedoCommand {
    pub base: BaseCommand,
}

impl RedoCommand {
    pub fn new(base: BaseCommand) -> Self {
        Self { base }
    }

    pub fn is_enabled(&self) -> bool {
        self.base.is_enabled()
    }

    /// Returns the batch the redo was applied in, `None` when there was
    /// nothing to redo.
    #[instrument(skip(self, model))]
    pub fn execute(&mut self, model: &mut Model, batch: Option<BatchId>) -> UndoResult<Option<BatchId>> {
        let Some(entry) = self.base.take(batch)? else {
            return Ok(None);
        };
        let batch_type = BatchType {
            is_undoable: true,
            origin: BatchOrigin::FromRedo,
        };
        let redoing_batch = model.change(batch_type, |writer| {
            let undoing = writer
                .model()
                .batch(entry.batch)
                .map(|batch| batch.operations().to_vec())
                .unwrap_or_default();
            reverse_batch(writer, entry.batch)?;
            let window = operations_after(writer.document(), &undoing);
            restore_selection(writer, &entry.selection, &window);
            Ok(writer.batch())
        })?;
        Ok(Some(redoing_batch))
    }
}
