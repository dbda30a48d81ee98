//! # Operations
//!
//! Low-level, reversible document changes. Every mutation of a document root
//! goes through one of these; removal is a move into the graveyard root so the
//! removed nodes can be brought back by undo.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::Node;
use crate::position::{moved_range_start, Position, Range, Stickiness};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Insert {
        position: Position,
        nodes: Vec<Node>,
    },
    /// `target` is expressed in coordinates from before the source removal.
    Move {
        source: Position,
        how_many: usize,
        target: Position,
    },
    Attribute {
        range: Range,
        key: String,
        old_value: Option<Value>,
        new_value: Option<Value>,
    },
    Rename {
        position: Position,
        old_name: String,
        new_name: String,
    },
    Marker {
        name: String,
        old_range: Option<Range>,
        new_range: Option<Range>,
        affects_data: bool,
    },
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Index of this operation in the document history. `None` for operations
    /// on detached content, which never reach the history.
    pub base_version: Option<u64>,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(base_version: Option<u64>, kind: OperationKind) -> Self {
        Self { base_version, kind }
    }

    pub fn no_op(base_version: Option<u64>) -> Self {
        Self::new(base_version, OperationKind::NoOp)
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            OperationKind::Insert { .. } => "insert",
            OperationKind::Move { ref target, .. } if target.is_in_graveyard() => "remove",
            OperationKind::Move { ref source, .. } if source.is_in_graveyard() => "reinsert",
            OperationKind::Move { .. } => "move",
            OperationKind::Attribute { .. } => "attribute",
            OperationKind::Rename { .. } => "rename",
            OperationKind::Marker { .. } => "marker",
            OperationKind::NoOp => "noop",
        }
    }

    pub fn is_document_operation(&self) -> bool {
        self.base_version.is_some()
    }

    /// Operation that undoes this one when applied right after it.
    pub fn reversed(&self) -> Operation {
        let base_version = self.base_version.map(|version| version + 1);
        let kind = match &self.kind {
            OperationKind::Insert { position, nodes } => OperationKind::Move {
                source: position.clone(),
                how_many: nodes.iter().map(Node::offset_size).sum(),
                target: Position::graveyard_start(),
            },
            OperationKind::Move {
                source,
                how_many,
                target,
            } => OperationKind::Move {
                source: moved_range_start(source, *how_many, target),
                how_many: *how_many,
                target: source.transformed_by_insertion(target, *how_many, Stickiness::ToNext),
            },
            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            } => OperationKind::Attribute {
                range: range.clone(),
                key: key.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            OperationKind::Rename {
                position,
                old_name,
                new_name,
            } => OperationKind::Rename {
                position: position.clone(),
                old_name: new_name.clone(),
                new_name: old_name.clone(),
            },
            OperationKind::Marker {
                name,
                old_range,
                new_range,
                affects_data,
            } => OperationKind::Marker {
                name: name.clone(),
                old_range: new_range.clone(),
                new_range: old_range.clone(),
                affects_data: *affects_data,
            },
            OperationKind::NoOp => OperationKind::NoOp,
        };
        Operation::new(base_version, kind)
    }

    /// Position the operation writes at, used for editability checks.
    pub fn target_range(&self) -> Option<Range> {
        match &self.kind {
            OperationKind::Insert { position, .. } => Some(Range::collapsed(position.clone())),
            OperationKind::Move {
                source,
                how_many,
                target,
            } => {
                if target.is_in_graveyard() {
                    Some(Range::from_offset(source.clone(), *how_many))
                } else {
                    Some(Range::collapsed(target.clone()))
                }
            }
            OperationKind::Attribute { range, .. } => Some(range.clone()),
            OperationKind::Rename { position, .. } => Some(Range::collapsed(position.clone())),
            OperationKind::Marker { new_range, .. } => new_range.clone(),
            OperationKind::NoOp => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(path: &[usize]) -> Position {
        Position::new("main", path.to_vec())
    }

    #[test]
    fn test_reversed_move_restores_source() {
        let op = Operation::new(
            Some(3),
            OperationKind::Move {
                source: pos(&[0, 1]),
                how_many: 2,
                target: pos(&[0, 6]),
            },
        );
        let reversed = op.reversed();
        assert_eq!(reversed.base_version, Some(4));
        assert_eq!(
            reversed.kind,
            OperationKind::Move {
                source: pos(&[0, 4]),
                how_many: 2,
                target: pos(&[0, 1]),
            }
        );
    }

    #[test]
    fn test_reversed_insert_is_removal() {
        let op = Operation::new(
            Some(0),
            OperationKind::Insert {
                position: pos(&[0, 0]),
                nodes: vec![Node::text("abc")],
            },
        );
        let reversed = op.reversed();
        assert_eq!(reversed.type_name(), "remove");
    }
}
