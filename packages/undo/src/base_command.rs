//! # Base command
//!
//! State shared by undo and redo: a stack of batches, each stored with the
//! selection the document had when it was added. Both commands reverse a
//! batch the same way, see [`reverse_batch`], and then put the stored
//! selection back, see [`restore_selection`].

use scribe_model::{
    transform_by_history, transform_range, BatchId, Document, ModelError, ModelResult, Operation,
    OperationKind, Range, SelectionSnapshot, TransformContext, Writer,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{UndoError, UndoResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackEntry {
    pub batch: BatchId,
    pub selection: SelectionSnapshot,
}

#[derive(Debug, Default)]
pub struct BaseCommand {
    /// Most recent last.
    stack: Vec<StackEntry>,
    /// Maximum number of entries kept (0 = unlimited).
    step_limit: usize,
}

impl BaseCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step_limit(step_limit: usize) -> Self {
        Self {
            stack: Vec::new(),
            step_limit,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.stack
    }

    /// Stores a batch with the document's current selection. The oldest
    /// entry is dropped once the step limit is exceeded.
    pub fn add_batch(&mut self, batch: BatchId, document: &Document) {
        self.stack.push(StackEntry {
            batch,
            selection: document.selection().snapshot(),
        });
        if self.step_limit > 0 && self.stack.len() > self.step_limit {
            let dropped = self.stack.remove(0);
            debug!(batch = %dropped.batch, "Dropped entry over the step limit");
        }
    }

    pub fn clear_stack(&mut self) {
        if !self.stack.is_empty() {
            info!(entries = self.stack.len(), "Clearing stack");
        }
        self.stack.clear();
    }

    /// Removes the named entry, or the top one. `Ok(None)` when the stack is empty.
    pub(crate) fn take(&mut self, batch: Option<BatchId>) -> UndoResult<Option<StackEntry>> {
        match batch {
            None => Ok(self.stack.pop()),
            Some(batch) => {
                let index = self
                    .stack
                    .iter()
                    .position(|entry| entry.batch == batch)
                    .ok_or(UndoError::BatchNotInStack(batch))?;
                Ok(Some(self.stack.remove(index)))
            }
        }
    }
}

/// Applies reversals of `batch`'s document operations, last first. Each
/// reversal is transformed by everything applied since its original and
/// becomes a no-op where the document can no longer be edited.
pub fn reverse_batch(writer: &mut Writer<'_>, batch: BatchId) -> ModelResult<()> {
    let operations: Vec<Operation> = writer
        .model()
        .batch(batch)
        .ok_or(ModelError::BatchNotFound(batch.0))?
        .operations()
        .iter()
        .filter(|operation| operation.is_document_operation())
        .cloned()
        .collect();

    let context = TransformContext {
        use_relations: true,
        force_weak_remove: true,
        a_is_strong: false,
    };
    for original in operations.iter().rev() {
        let Some(version) = original.base_version else {
            continue;
        };
        let history = writer.document().history();
        let window = history.operations_from(version + 1);
        let reversals = transform_by_history(original.reversed(), window, context);
        debug!(
            operation = original.type_name(),
            version,
            reversals = reversals.len(),
            "Transformed reversal"
        );

        for reversal in reversals {
            let editable = reversal
                .target_range()
                .map_or(true, |range| writer.can_edit_at(&range));
            let reversal = if editable {
                reversal
            } else {
                warn!(operation = reversal.type_name(), "Reversal target is not editable, applying a no-op");
                Operation::new(None, OperationKind::NoOp)
            };
            let applied = writer.apply_operation(reversal)?;
            writer.history_mut().set_operation_as_undone(original, &applied);
        }
    }
    Ok(())
}

/// Sorts ranges and joins the ones that touch or overlap.
pub fn normalize_ranges(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.sort_by(|a, b| a.start.cmp(&b.start));
    let mut merged: Vec<Range> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last().and_then(|last| last.join(&range)) {
            Some(joined) => {
                if let Some(last) = merged.last_mut() {
                    *last = joined;
                }
            }
            None => merged.push(range),
        }
    }
    merged
}

/// Transforms a stored selection by `window` and sets it. Of the fragments
/// one range turns into, only the first outside the graveyard is kept. When
/// nothing survives the selection is left as it is.
pub fn restore_selection(writer: &mut Writer<'_>, selection: &SelectionSnapshot, window: &[Operation]) {
    let ranges: Vec<Range> = selection
        .ranges
        .iter()
        .filter_map(|range| {
            let fragments = window.iter().fold(vec![range.clone()], |fragments, operation| {
                fragments
                    .iter()
                    .flat_map(|fragment| transform_range(fragment, operation))
                    .collect()
            });
            fragments.into_iter().find(|fragment| !fragment.is_in_graveyard())
        })
        .collect();

    if ranges.is_empty() {
        return;
    }
    writer.set_selection(normalize_ranges(ranges), selection.is_backward);
}

/// Operations applied after the last operation of `batch`.
pub(crate) fn operations_after(document: &Document, batch_operations: &[Operation]) -> Vec<Operation> {
    let from = batch_operations
        .iter()
        .filter_map(|operation| operation.base_version)
        .max()
        .map_or(0, |version| version + 1);
    document.history().operations_from(from).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_model::Position;

    fn range(start: usize, end: usize) -> Range {
        Range::new(
            Position::new("main", vec![0, start]),
            Position::new("main", vec![0, end]),
        )
    }

    #[test]
    fn test_touching_ranges_are_joined() {
        let ranges = normalize_ranges(vec![range(3, 4), range(1, 3), range(6, 7)]);
        assert_eq!(ranges, vec![range(1, 4), range(6, 7)]);
    }

    #[test]
    fn test_step_limit_drops_oldest() {
        let document = Document::new(&["main"]);
        let mut command = BaseCommand::with_step_limit(2);
        for id in 0..3 {
            command.add_batch(BatchId(id), &document);
        }
        let batches: Vec<BatchId> = command.entries().iter().map(|entry| entry.batch).collect();
        assert_eq!(batches, vec![BatchId(1), BatchId(2)]);
    }

    #[test]
    fn test_taking_unknown_batch_fails() {
        let document = Document::new(&["main"]);
        let mut command = BaseCommand::new();
        command.add_batch(BatchId(4), &document);
        assert_eq!(command.take(Some(BatchId(9))), Err(UndoError::BatchNotInStack(BatchId(9))));
        assert_eq!(command.take(None).map(|entry| entry.map(|entry| entry.batch)), Ok(Some(BatchId(4))));
        assert_eq!(command.take(None), Ok(None));
    }
}
