//! Document history: every applied document operation, indexed by its base
//! version, plus the "undone by" relation used by undo and redo.

use std::collections::HashMap;

use crate::operation::Operation;

#[derive(Debug, Default)]
pub struct History {
    operations: Vec<Operation>,
    /// Original base version -> base version of the operation undoing it.
    undone: HashMap<u64, u64>,
    /// Undoing base version -> original base version.
    undoing: HashMap<u64, u64>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Version the next operation will get.
    pub fn version(&self) -> u64 {
        self.operations.len() as u64
    }

    pub fn operation(&self, base_version: u64) -> Option<&Operation> {
        self.operations.get(base_version as usize)
    }

    /// Operations committed from `from` (inclusive) onwards.
    pub fn operations_from(&self, from: u64) -> &[Operation] {
        let from = (from as usize).min(self.operations.len());
        &self.operations[from..]
    }

    pub fn set_operation_as_undone(&mut self, undone: &Operation, undoing: &Operation) {
        if let (Some(original), Some(reversal)) = (undone.base_version, undoing.base_version) {
            self.undone.insert(original, reversal);
            self.undoing.insert(reversal, original);
        }
    }

    pub fn is_undone_operation(&self, operation: &Operation) -> bool {
        operation
            .base_version
            .is_some_and(|version| self.undone.contains_key(&version))
    }

    pub fn is_undoing_operation(&self, operation: &Operation) -> bool {
        operation
            .base_version
            .is_some_and(|version| self.undoing.contains_key(&version))
    }

    pub fn undone_operation(&self, undoing: &Operation) -> Option<&Operation> {
        let version = undoing.base_version?;
        self.undoing
            .get(&version)
            .and_then(|original| self.operation(*original))
    }
}
