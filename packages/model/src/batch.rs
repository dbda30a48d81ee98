//! Batches group the operations of one logical change; one batch is one undo step.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// Who created a batch. Set once when the batch is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOrigin {
    Fresh,
    FromUndo,
    FromRedo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchType {
    pub is_undoable: bool,
    pub origin: BatchOrigin,
}

impl BatchType {
    pub const DEFAULT: BatchType = BatchType {
        is_undoable: true,
        origin: BatchOrigin::Fresh,
    };

    pub const TRANSPARENT: BatchType = BatchType {
        is_undoable: false,
        origin: BatchOrigin::Fresh,
    };
}

impl Default for BatchType {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone)]
pub struct Batch {
    id: BatchId,
    origin: BatchOrigin,
    is_undoable: bool,
    operations: Vec<Operation>,
}

impl Batch {
    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn origin(&self) -> BatchOrigin {
        self.origin
    }

    pub fn is_undoable(&self) -> bool {
        self.is_undoable
    }

    /// Operations in application order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn base_version(&self) -> Option<u64> {
        self.operations.iter().find_map(|op| op.base_version)
    }
}

#[derive(Debug, Default)]
pub struct BatchRegistry {
    batches: HashMap<BatchId, Batch>,
    next_id: u64,
}

impl BatchRegistry {
    pub fn create(&mut self, batch_type: BatchType) -> BatchId {
        let id = BatchId(self.next_id);
        self.next_id += 1;
        self.batches.insert(
            id,
            Batch {
                id,
                origin: batch_type.origin,
                is_undoable: batch_type.is_undoable,
                operations: Vec::new(),
            },
        );
        id
    }

    pub fn get(&self, id: BatchId) -> Option<&Batch> {
        self.batches.get(&id)
    }

    pub(crate) fn push_operation(&mut self, id: BatchId, operation: Operation) {
        if let Some(batch) = self.batches.get_mut(&id) {
            batch.operations.push(operation);
        }
    }
}
