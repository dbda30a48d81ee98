//! # Operational Transformation
//!
//! `transform(a, b)` rewrites `a` so it can be applied after `b`, where both
//! were originally expressed against the same document state. The result is a
//! list because `b` may split the range `a` works on.
//!
//! Only insertions and moves shift positions. Attribute and rename
//! operations on the same target only adjust `a`'s old values (or yield to
//! `b` when `a` is weak).

use tracing::debug;

use crate::node::Node;
use crate::operation::{Operation, OperationKind};
use crate::position::{Position, Range, Stickiness};

#[derive(Debug, Clone, Copy, Default)]
pub struct TransformContext {
    /// Reinsertions stay before content inserted at the same spot later on.
    pub use_relations: bool,
    /// When both `a` and `b` remove the same nodes, `a` gives up its part.
    pub force_weak_remove: bool,
    /// `a` wins ties (same insertion point, same attribute key).
    pub a_is_strong: bool,
}

pub fn transform(a: &Operation, b: &Operation, context: TransformContext) -> Vec<Operation> {
    let base_version = b.base_version.map(|version| version + 1);
    let kinds = match &b.kind {
        OperationKind::Insert { position, nodes } => {
            let how_many = nodes.iter().map(Node::offset_size).sum();
            by_insertion(&a.kind, position, how_many, context)
        }
        OperationKind::Move {
            source,
            how_many,
            target,
        } => by_move(&a.kind, source, *how_many, target, context),
        OperationKind::Attribute {
            range: b_range,
            key: b_key,
            new_value: b_new,
            ..
        } => match &a.kind {
            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            } if key == b_key && range.is_intersecting(b_range) => {
                if context.a_is_strong {
                    vec![OperationKind::Attribute {
                        range: range.clone(),
                        key: key.clone(),
                        old_value: b_new.clone(),
                        new_value: new_value.clone(),
                    }]
                } else {
                    range
                        .difference(b_range)
                        .into_iter()
                        .map(|range| OperationKind::Attribute {
                            range,
                            key: key.clone(),
                            old_value: old_value.clone(),
                            new_value: new_value.clone(),
                        })
                        .collect()
                }
            }
            kind => vec![kind.clone()],
        },
        OperationKind::Rename {
            position: b_position,
            new_name: b_new,
            ..
        } => match &a.kind {
            OperationKind::Rename {
                position, new_name, ..
            } if position == b_position => vec![OperationKind::Rename {
                position: position.clone(),
                old_name: b_new.clone(),
                new_name: new_name.clone(),
            }],
            kind => vec![kind.clone()],
        },
        OperationKind::Marker { .. } | OperationKind::NoOp => vec![a.kind.clone()],
    };

    let mut result: Vec<Operation> = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let mut operation = Operation::new(base_version, kind);
        // Later fragments are applied after the earlier ones.
        for earlier in &result {
            if let Some(next) = transform(&operation, earlier, context).into_iter().next() {
                operation = next;
            }
        }
        result.push(operation);
    }
    if result.is_empty() {
        result.push(Operation::no_op(base_version));
    }
    result
}

fn by_insertion(
    a: &OperationKind,
    at: &Position,
    how_many: usize,
    context: TransformContext,
) -> Vec<OperationKind> {
    let stickiness = if context.a_is_strong {
        Stickiness::ToPrevious
    } else {
        Stickiness::ToNext
    };
    match a {
        OperationKind::Insert { position, nodes } => vec![OperationKind::Insert {
            position: position.transformed_by_insertion(at, how_many, stickiness),
            nodes: nodes.clone(),
        }],
        OperationKind::Move {
            source,
            how_many: moved,
            target,
        } => {
            let target_stickiness = if context.use_relations && source.is_in_graveyard() {
                Stickiness::ToPrevious
            } else {
                stickiness
            };
            let target = target.transformed_by_insertion(at, how_many, target_stickiness);
            Range::from_offset(source.clone(), *moved)
                .transformed_by_insertion(at, how_many, true)
                .into_iter()
                .map(|range| OperationKind::Move {
                    how_many: range.flat_size(),
                    source: range.start,
                    target: target.clone(),
                })
                .collect()
        }
        OperationKind::Attribute {
            range,
            key,
            old_value,
            new_value,
        } => range
            .transformed_by_insertion(at, how_many, true)
            .into_iter()
            .map(|range| OperationKind::Attribute {
                range,
                key: key.clone(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            })
            .collect(),
        OperationKind::Rename {
            position,
            old_name,
            new_name,
        } => vec![OperationKind::Rename {
            position: position.transformed_by_insertion(at, how_many, Stickiness::ToNext),
            old_name: old_name.clone(),
            new_name: new_name.clone(),
        }],
        OperationKind::Marker {
            name,
            old_range,
            new_range,
            affects_data,
        } => vec![OperationKind::Marker {
            name: name.clone(),
            old_range: old_range
                .as_ref()
                .map(|range| span(range.transformed_by_insertion(at, how_many, false))),
            new_range: new_range
                .as_ref()
                .map(|range| span(range.transformed_by_insertion(at, how_many, false))),
            affects_data: *affects_data,
        }],
        OperationKind::NoOp => vec![OperationKind::NoOp],
    }
}

fn by_move(
    a: &OperationKind,
    source: &Position,
    how_many: usize,
    target: &Position,
    context: TransformContext,
) -> Vec<OperationKind> {
    let stickiness = if context.a_is_strong {
        Stickiness::ToPrevious
    } else {
        Stickiness::ToNext
    };
    match a {
        OperationKind::Insert { position, nodes } => vec![OperationKind::Insert {
            position: position.transformed_by_move(source, how_many, target, stickiness),
            nodes: nodes.clone(),
        }],
        OperationKind::Move {
            source: a_source,
            how_many: a_how_many,
            target: a_target,
        } => {
            let a_range = Range::from_offset(a_source.clone(), *a_how_many);
            let both_remove = a_target.is_in_graveyard()
                && target.is_in_graveyard()
                && !a_source.is_in_graveyard();
            let new_target = a_target.transformed_by_move(source, how_many, target, stickiness);
            a_range
                .transformed_by_move(source, how_many, target)
                .into_iter()
                .filter(|range| {
                    let already_removed = both_remove && range.is_in_graveyard();
                    if already_removed && context.force_weak_remove {
                        debug!(?range, "Dropping removal already done by another operation");
                        return false;
                    }
                    range.is_flat() && !range.is_collapsed()
                })
                .map(|range| OperationKind::Move {
                    how_many: range.flat_size(),
                    source: range.start,
                    target: new_target.clone(),
                })
                .collect()
        }
        OperationKind::Attribute {
            range,
            key,
            old_value,
            new_value,
        } => range
            .transformed_by_move(source, how_many, target)
            .into_iter()
            .filter(|range| !range.is_collapsed())
            .map(|range| OperationKind::Attribute {
                range,
                key: key.clone(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            })
            .collect(),
        OperationKind::Rename {
            position,
            old_name,
            new_name,
        } => {
            // The renamed element is the node after `position`; follow it.
            let on_element = Range::from_offset(position.clone(), 1);
            let position = on_element
                .transformed_by_move(source, how_many, target)
                .into_iter()
                .next()
                .map(|range| range.start)
                .unwrap_or_else(|| position.clone());
            vec![OperationKind::Rename {
                position,
                old_name: old_name.clone(),
                new_name: new_name.clone(),
            }]
        }
        OperationKind::Marker {
            name,
            old_range,
            new_range,
            affects_data,
        } => vec![OperationKind::Marker {
            name: name.clone(),
            old_range: old_range
                .as_ref()
                .map(|range| span(range.transformed_by_move(source, how_many, target))),
            new_range: new_range
                .as_ref()
                .map(|range| span(range.transformed_by_move(source, how_many, target))),
            affects_data: *affects_data,
        }],
        OperationKind::NoOp => vec![OperationKind::NoOp],
    }
}

/// The first fragment, extended by the fragments touching it.
fn span(ranges: Vec<Range>) -> Range {
    let mut iter = ranges.into_iter();
    let Some(first) = iter.next() else {
        return Range::collapsed(Position::graveyard_start());
    };
    iter.fold(first, |acc, range| acc.join(&range).unwrap_or(acc))
}

/// Transforms a range by an applied operation. Fragments keep document-order
/// semantics of [`Range::transformed_by_move`].
pub fn transform_range(range: &Range, operation: &Operation) -> Vec<Range> {
    match &operation.kind {
        OperationKind::Insert { position, nodes } => {
            let how_many = nodes.iter().map(Node::offset_size).sum();
            range.transformed_by_insertion(position, how_many, false)
        }
        OperationKind::Move {
            source,
            how_many,
            target,
        } => range.transformed_by_move(source, *how_many, target),
        _ => vec![range.clone()],
    }
}

/// Like [`transform_range`], but keeps one range spanning the fragments that
/// share the first fragment's root. Used for ranges that must stay whole,
/// like marker ranges.
pub fn transform_range_joined(range: &Range, operation: &Operation) -> Range {
    span(transform_range(range, operation))
}

/// Transforms `operation` by every operation in `window`, in order.
pub fn transform_by_history(operation: Operation, window: &[Operation], context: TransformContext) -> Vec<Operation> {
    let mut operations = vec![operation];
    for b in window {
        operations = operations
            .iter()
            .flat_map(|a| transform(a, b, context))
            .collect();
    }
    operations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pos(path: &[usize]) -> Position {
        Position::new("main", path.to_vec())
    }

    #[test]
    fn test_attribute_split_by_move() {
        let a = Operation::new(
            Some(2),
            OperationKind::Attribute {
                range: Range::new(pos(&[0, 2]), pos(&[0, 4])),
                key: "bold".into(),
                old_value: Some(json!(true)),
                new_value: None,
            },
        );
        let b = Operation::new(
            Some(2),
            OperationKind::Move {
                source: pos(&[0, 1]),
                how_many: 2,
                target: pos(&[0, 6]),
            },
        );
        let result = transform(&a, &b, TransformContext::default());
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].base_version, Some(3));
        assert_eq!(result[1].base_version, Some(4));
    }

    #[test]
    fn test_weak_remove_drops_shared_part() {
        let a = Operation::new(
            Some(1),
            OperationKind::Move {
                source: pos(&[0, 0]),
                how_many: 3,
                target: Position::graveyard_start(),
            },
        );
        let b = a.clone();
        let context = TransformContext {
            force_weak_remove: true,
            ..Default::default()
        };
        let result = transform(&a, &b, context);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].kind, OperationKind::NoOp);
    }

    #[test]
    fn test_insert_after_equal_position_when_weak() {
        let a = Operation::new(
            Some(0),
            OperationKind::Insert {
                position: pos(&[0, 1]),
                nodes: vec![Node::text("x")],
            },
        );
        let b = Operation::new(
            Some(0),
            OperationKind::Insert {
                position: pos(&[0, 1]),
                nodes: vec![Node::text("yy")],
            },
        );
        let result = transform(&a, &b, TransformContext::default());
        match &result[0].kind {
            OperationKind::Insert { position, .. } => assert_eq!(position, &pos(&[0, 3])),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_history_window_keeps_graveyard_shift_of_undone_pair() {
        let reinsert = Operation::new(
            Some(0),
            OperationKind::Move {
                source: Position::graveyard_start(),
                how_many: 1,
                target: pos(&[0]),
            },
        );
        let window = vec![
            Operation::new(
                Some(1),
                OperationKind::Insert {
                    position: pos(&[0, 3]),
                    nodes: vec![Node::text("X")],
                },
            ),
            Operation::new(
                Some(2),
                OperationKind::Move {
                    source: pos(&[0, 3]),
                    how_many: 1,
                    target: Position::graveyard_start(),
                },
            ),
        ];
        let context = TransformContext {
            use_relations: true,
            force_weak_remove: true,
            ..Default::default()
        };
        let result = transform_by_history(reinsert, &window, context);
        assert_eq!(result.len(), 1);
        match &result[0].kind {
            OperationKind::Move { source, target, .. } => {
                assert_eq!(source.path, vec![1]);
                assert!(source.is_in_graveyard());
                assert_eq!(target, &pos(&[0]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
