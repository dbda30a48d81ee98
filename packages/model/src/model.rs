//! # Model and change blocks
//!
//! [`Model::change`] is the only way to mutate the document. It hands out a
//! [`Writer`], which cannot be constructed anywhere else, and records every
//! operation the writer applies in the block's batch.

use serde_json::Value;
use tracing::{debug, instrument};

use crate::batch::{Batch, BatchId, BatchRegistry, BatchType};
use crate::document::{Document, Item};
use crate::error::{ModelError, ModelResult};
use crate::history::History;
use crate::node::{Attributes, Element, ElementId, Node, Text};
use crate::operation::{Operation, OperationKind};
use crate::position::{Position, Range};
use crate::schema::Schema;

/// Decides whether a range may still be edited.
pub type CanEditAt = Box<dyn Fn(&Document, &Range) -> bool>;

/// Root name used by operations recorded on detached fragments.
pub const FRAGMENT_ROOT: &str = "$fragment";

/// An operation applied to the document, with the batch it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedOperation {
    pub operation: Operation,
    pub batch: BatchId,
}

pub struct Model {
    document: Document,
    schema: Schema,
    batches: BatchRegistry,
    applied: Vec<AppliedOperation>,
    can_edit_at: CanEditAt,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("document", &self.document)
            .field("schema", &self.schema)
            .field("applied", &self.applied.len())
            .finish()
    }
}

impl Model {
    pub fn new<S: AsRef<str>>(root_names: &[S]) -> Self {
        Self {
            document: Document::new(root_names),
            schema: Schema::default(),
            batches: BatchRegistry::default(),
            applied: Vec::new(),
            can_edit_at: Box::new(|_, range| !range.is_in_graveyard()),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Mutable document access for bookkeeping that is not a tree change
    /// (resetting the differ after conversion).
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn batch(&self, id: BatchId) -> Option<&Batch> {
        self.batches.get(id)
    }

    pub fn create_batch(&mut self, batch_type: BatchType) -> BatchId {
        self.batches.create(batch_type)
    }

    pub fn set_can_edit_at(&mut self, predicate: impl Fn(&Document, &Range) -> bool + 'static) {
        self.can_edit_at = Box::new(predicate);
    }

    pub fn can_edit_at(&self, range: &Range) -> bool {
        (self.can_edit_at)(&self.document, range)
    }

    /// Runs a change block in a new batch of the given type.
    #[instrument(skip(self, block), fields(undoable = batch_type.is_undoable, origin = ?batch_type.origin))]
    pub fn change<R>(
        &mut self,
        batch_type: BatchType,
        block: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>,
    ) -> ModelResult<R> {
        let batch = self.batches.create(batch_type);
        self.change_in(batch, block)
    }

    /// Runs a change block that appends to an existing batch.
    pub fn change_in<R>(
        &mut self,
        batch: BatchId,
        block: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>,
    ) -> ModelResult<R> {
        if self.batches.get(batch).is_none() {
            return Err(ModelError::BatchNotFound(batch.0));
        }
        let mut writer = Writer { model: self, batch };
        let result = block(&mut writer);
        debug!(%batch, applied = self.applied.len(), "Change block finished");
        result
    }

    /// Drains the operations applied since the last call.
    pub fn take_applied(&mut self) -> Vec<AppliedOperation> {
        std::mem::take(&mut self.applied)
    }
}

/// Mutation handle for one change block.
pub struct Writer<'a> {
    model: &'a mut Model,
    batch: BatchId,
}

impl<'a> Writer<'a> {
    pub fn batch(&self) -> BatchId {
        self.batch
    }

    pub fn document(&self) -> &Document {
        &self.model.document
    }

    pub fn schema(&self) -> &Schema {
        &self.model.schema
    }

    pub fn model(&self) -> &Model {
        self.model
    }

    pub fn history_mut(&mut self) -> &mut History {
        self.model.document.history_mut()
    }

    pub fn can_edit_at(&self, range: &Range) -> bool {
        self.model.can_edit_at(range)
    }

    /// Nested change block. Reuses this block's batch.
    pub fn change<R>(&mut self, block: impl FnOnce(&mut Writer<'_>) -> ModelResult<R>) -> ModelResult<R> {
        block(self)
    }

    pub fn create_element(&mut self, name: impl Into<String>) -> Element {
        self.model.document.create_element(name)
    }

    /// Applies a document operation at the current version, records it in the
    /// batch and returns it as applied.
    pub fn apply_operation(&mut self, mut operation: Operation) -> ModelResult<Operation> {
        operation.base_version = Some(self.model.document.version());
        self.model.document.apply_operation(&operation)?;
        self.model.batches.push_operation(self.batch, operation.clone());
        self.model.applied.push(AppliedOperation {
            operation: operation.clone(),
            batch: self.batch,
        });
        Ok(operation)
    }

    fn apply(&mut self, kind: OperationKind) -> ModelResult<Operation> {
        self.apply_operation(Operation::new(None, kind))
    }

    pub fn insert(&mut self, position: &Position, nodes: Vec<Node>) -> ModelResult<()> {
        if nodes.iter().all(|node| node.offset_size() == 0) {
            return Ok(());
        }
        self.apply(OperationKind::Insert {
            position: position.clone(),
            nodes,
        })?;
        Ok(())
    }

    pub fn insert_text(&mut self, data: &str, attributes: Attributes, position: &Position) -> ModelResult<()> {
        let text = Text {
            data: data.to_string(),
            attributes,
        };
        self.insert(position, vec![Node::Text(text)])
    }

    pub fn insert_element(
        &mut self,
        name: &str,
        attributes: Attributes,
        position: &Position,
    ) -> ModelResult<ElementId> {
        let mut element = self.create_element(name);
        element.attributes = attributes;
        let id = element.id;
        self.insert(position, vec![Node::Element(element)])?;
        Ok(id)
    }

    /// Moves the content of `range` to the graveyard, last flat part first.
    pub fn remove(&mut self, range: &Range) -> ModelResult<()> {
        let flat = self.model.document.flat_ranges(range)?;
        for part in flat.into_iter().rev() {
            self.apply(OperationKind::Move {
                how_many: part.flat_size(),
                source: part.start,
                target: Position::graveyard_start(),
            })?;
        }
        Ok(())
    }

    pub fn remove_element(&mut self, id: ElementId) -> ModelResult<()> {
        let range = self
            .model
            .document
            .range_on(id)
            .ok_or(ModelError::ElementNotFound(id))?;
        self.remove(&range)
    }

    /// `target` is given in coordinates from before the move.
    pub fn move_range(&mut self, range: &Range, target: &Position) -> ModelResult<()> {
        if !range.is_flat() {
            return Err(ModelError::RangeNotFlat);
        }
        if range.is_collapsed() {
            return Ok(());
        }
        self.apply(OperationKind::Move {
            source: range.start.clone(),
            how_many: range.flat_size(),
            target: target.clone(),
        })?;
        Ok(())
    }

    pub fn set_attribute(&mut self, key: &str, value: Value, range: &Range) -> ModelResult<()> {
        self.change_attribute(key, Some(value), range)
    }

    pub fn remove_attribute(&mut self, key: &str, range: &Range) -> ModelResult<()> {
        self.change_attribute(key, None, range)
    }

    pub fn set_element_attribute(&mut self, id: ElementId, key: &str, value: Value) -> ModelResult<()> {
        let range = self
            .model
            .document
            .range_on(id)
            .ok_or(ModelError::ElementNotFound(id))?;
        self.change_attribute(key, Some(value), &range)
    }

    pub fn remove_element_attribute(&mut self, id: ElementId, key: &str) -> ModelResult<()> {
        let range = self
            .model
            .document
            .range_on(id)
            .ok_or(ModelError::ElementNotFound(id))?;
        self.change_attribute(key, None, &range)
    }

    /// One operation per run of items sharing the same old value.
    fn change_attribute(&mut self, key: &str, value: Option<Value>, range: &Range) -> ModelResult<()> {
        let document = &self.model.document;
        let mut runs: Vec<(Range, Option<Value>)> = Vec::new();
        for flat in document.flat_ranges(range)? {
            for item in document.items(&flat, true) {
                let old = item.attributes().get(key).cloned();
                let item_range = item.range();
                match runs.last_mut() {
                    Some((run, run_old)) if *run_old == old && run.end == item_range.start => {
                        run.end = item_range.end;
                    }
                    _ => runs.push((item_range, old)),
                }
            }
        }
        for (run, old) in runs {
            if old == value {
                continue;
            }
            self.apply(OperationKind::Attribute {
                range: run,
                key: key.to_string(),
                old_value: old,
                new_value: value.clone(),
            })?;
        }
        Ok(())
    }

    pub fn rename(&mut self, id: ElementId, new_name: &str) -> ModelResult<()> {
        let position = self
            .model
            .document
            .position_before(id)
            .ok_or(ModelError::ElementNotFound(id))?;
        let old_name = match self.model.document.element_after(&position) {
            Some(element) => element.name.clone(),
            None => return Err(ModelError::ElementNotFound(id)),
        };
        if old_name == new_name {
            return Ok(());
        }
        self.apply(OperationKind::Rename {
            position,
            old_name,
            new_name: new_name.to_string(),
        })?;
        Ok(())
    }

    pub fn add_marker(&mut self, name: &str, range: Range, affects_data: bool) -> ModelResult<()> {
        let old_range = self.model.document.markers().get(name).map(|marker| marker.range.clone());
        self.apply(OperationKind::Marker {
            name: name.to_string(),
            old_range,
            new_range: Some(range),
            affects_data,
        })?;
        Ok(())
    }

    pub fn update_marker(&mut self, name: &str, range: Range) -> ModelResult<()> {
        let affects_data = self
            .model
            .document
            .markers()
            .get(name)
            .map(|marker| marker.affects_data)
            .unwrap_or(false);
        self.add_marker(name, range, affects_data)
    }

    pub fn remove_marker(&mut self, name: &str) -> ModelResult<()> {
        let Some(marker) = self.model.document.markers().get(name).cloned() else {
            return Ok(());
        };
        self.apply(OperationKind::Marker {
            name: name.to_string(),
            old_range: Some(marker.range),
            new_range: None,
            affects_data: marker.affects_data,
        })?;
        Ok(())
    }

    pub fn set_selection(&mut self, ranges: Vec<Range>, backward: bool) {
        self.model.document.selection_mut().set_ranges(ranges, backward);
    }

    pub fn set_selection_at(&mut self, position: Position) {
        self.set_selection(vec![Range::collapsed(position)], false);
    }

    pub fn set_selection_attribute(&mut self, key: &str, value: Value) {
        let inherited = self.model.document.selection_attributes();
        self.model
            .document
            .selection_mut()
            .set_attribute(inherited, key, value);
    }

    pub fn remove_selection_attribute(&mut self, key: &str) {
        let inherited = self.model.document.selection_attributes();
        self.model
            .document
            .selection_mut()
            .remove_attribute(inherited, key);
    }

    /// Appends nodes to a detached fragment. The operation is recorded in the
    /// batch but never reaches the document or its history.
    pub fn append_to_fragment(&mut self, fragment: &mut Element, nodes: Vec<Node>) {
        let position = Position::new(FRAGMENT_ROOT, vec![fragment.max_offset()]);
        fragment.children.extend(nodes.iter().cloned());
        fragment.normalize();
        self.model
            .batches
            .push_operation(self.batch, Operation::new(None, OperationKind::Insert { position, nodes }));
    }

    /// Items of `range`, for callers that need to inspect content mid-block.
    pub fn items(&self, range: &Range) -> Vec<Item> {
        self.model.document.items(range, false)
    }
}
