//! Positions and ranges in the model tree.
//!
//! A [`Position`] is an offset path from a named root: every entry but the
//! last is the offset of an ancestor element in its parent, the last entry is
//! the offset inside the parent. Positions order lexicographically, which
//! matches document order inside one root.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the root holding removed content.
pub const GRAVEYARD: &str = "$graveyard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stickiness {
    /// Content inserted exactly at the position ends up before it.
    ToNext,
    /// Content inserted exactly at the position ends up after it.
    ToPrevious,
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub root: String,
    pub path: Vec<usize>,
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.root, self.path)
    }
}

impl Position {
    pub fn new(root: impl Into<String>, path: Vec<usize>) -> Self {
        debug_assert!(!path.is_empty(), "position path cannot be empty");
        Self {
            root: root.into(),
            path,
        }
    }

    pub fn graveyard_start() -> Self {
        Self::new(GRAVEYARD, vec![0])
    }

    pub fn offset(&self) -> usize {
        self.path.last().copied().unwrap_or(0)
    }

    pub fn parent_path(&self) -> &[usize] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    pub fn with_offset(&self, offset: usize) -> Position {
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            *last = offset;
        }
        Position {
            root: self.root.clone(),
            path,
        }
    }

    pub fn shifted_by(&self, delta: isize) -> Position {
        self.with_offset((self.offset() as isize + delta).max(0) as usize)
    }

    /// Position inside the element that starts at this position.
    pub fn child(&self, offset: usize) -> Position {
        let mut path = self.path.clone();
        path.push(offset);
        Position {
            root: self.root.clone(),
            path,
        }
    }

    /// Position right after the parent element. `None` for root-level positions.
    pub fn after_parent(&self) -> Option<Position> {
        if self.path.len() < 2 {
            return None;
        }
        let mut path = self.parent_path().to_vec();
        if let Some(last) = path.last_mut() {
            *last += 1;
        }
        Some(Position {
            root: self.root.clone(),
            path,
        })
    }

    /// Position right before the parent element. `None` for root-level positions.
    pub fn before_parent(&self) -> Option<Position> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Position {
            root: self.root.clone(),
            path: self.parent_path().to_vec(),
        })
    }

    pub fn is_in_graveyard(&self) -> bool {
        self.root == GRAVEYARD
    }

    pub fn has_same_parent_as(&self, other: &Position) -> bool {
        self.root == other.root && self.parent_path() == other.parent_path()
    }

    /// Document-order comparison; `None` when the roots differ.
    pub fn compare(&self, other: &Position) -> Option<Ordering> {
        (self.root == other.root).then(|| self.path.cmp(&other.path))
    }

    pub fn is_before(&self, other: &Position) -> bool {
        self.compare(other) == Some(Ordering::Less)
    }

    pub fn is_after(&self, other: &Position) -> bool {
        self.compare(other) == Some(Ordering::Greater)
    }

    /// Ancestor offset paths between the root and this position, outermost
    /// first. Each entry is the position before an ancestor element.
    pub fn ancestor_positions(&self) -> Vec<Position> {
        (1..self.path.len())
            .map(|len| Position {
                root: self.root.clone(),
                path: self.path[..len].to_vec(),
            })
            .collect()
    }

    /// Depth at which `at` (a position in some parent) is a prefix of `self`.
    fn affected_depth(&self, at: &Position) -> Option<usize> {
        if self.root != at.root {
            return None;
        }
        let depth = at.depth();
        (self.path.len() > depth && self.path[..depth] == at.path[..depth]).then_some(depth)
    }

    pub fn transformed_by_insertion(
        &self,
        at: &Position,
        how_many: usize,
        stickiness: Stickiness,
    ) -> Position {
        let mut result = self.clone();
        let Some(depth) = self.affected_depth(at) else {
            return result;
        };
        let offset = self.path[depth];
        let shift = if self.depth() == depth {
            at.offset() < offset || (at.offset() == offset && stickiness == Stickiness::ToNext)
        } else {
            at.offset() <= offset
        };
        if shift {
            result.path[depth] += how_many;
        }
        result
    }

    /// `None` when the position was inside the removed nodes.
    pub fn transformed_by_deletion(&self, at: &Position, how_many: usize) -> Option<Position> {
        let mut result = self.clone();
        let Some(depth) = self.affected_depth(at) else {
            return Some(result);
        };
        let offset = self.path[depth];
        let start = at.offset();
        let end = start + how_many;
        if self.depth() == depth {
            if offset <= start {
                return Some(result);
            }
            if offset >= end {
                result.path[depth] -= how_many;
                return Some(result);
            }
            None
        } else {
            if offset < start {
                return Some(result);
            }
            if offset >= end {
                result.path[depth] -= how_many;
                return Some(result);
            }
            None
        }
    }

    /// Maps a position inside (or on the boundary of) a moved range starting
    /// at `source` into the moved content at `target` (post-removal coordinates).
    pub fn combined(&self, source: &Position, target: &Position) -> Position {
        let depth = source.depth();
        let mut path = target.path.clone();
        if let Some(last) = path.last_mut() {
            *last += self.path[depth].saturating_sub(source.offset());
        }
        path.extend_from_slice(&self.path[depth + 1..]);
        Position {
            root: target.root.clone(),
            path,
        }
    }

    /// `target` is expressed in coordinates from before the source removal.
    pub fn transformed_by_move(
        &self,
        source: &Position,
        how_many: usize,
        target: &Position,
        stickiness: Stickiness,
    ) -> Position {
        let target = moved_range_start(source, how_many, target);
        match self.transformed_by_deletion(source, how_many) {
            None => self.combined(source, &target),
            Some(position) => position.transformed_by_insertion(&target, how_many, stickiness),
        }
    }
}

/// Where moved content starts after a move, given a pre-removal target.
pub fn moved_range_start(source: &Position, how_many: usize, target: &Position) -> Position {
    target
        .transformed_by_deletion(source, how_many)
        .unwrap_or_else(|| target.clone())
}

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?} - {:?}]", self.start, self.end.path)
    }
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        if start.is_after(&end) {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    pub fn collapsed(position: Position) -> Self {
        Self {
            start: position.clone(),
            end: position,
        }
    }

    /// Flat range covering `how_many` offsets from `start`.
    pub fn from_offset(start: Position, how_many: usize) -> Self {
        let end = start.shifted_by(how_many as isize);
        Self { start, end }
    }

    pub fn root(&self) -> &str {
        &self.start.root
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn is_flat(&self) -> bool {
        self.start.has_same_parent_as(&self.end)
    }

    pub fn is_in_graveyard(&self) -> bool {
        self.start.is_in_graveyard()
    }

    /// Offset span of a flat range.
    pub fn flat_size(&self) -> usize {
        self.end.offset().saturating_sub(self.start.offset())
    }

    /// Strict containment, like a caret strictly inside the range.
    pub fn contains_position(&self, position: &Position) -> bool {
        position.is_after(&self.start) && position.is_before(&self.end)
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        !other.start.is_before(&self.start) && !other.end.is_after(&self.end)
            && self.start.root == other.start.root
    }

    pub fn is_intersecting(&self, other: &Range) -> bool {
        self.start.root == other.start.root
            && self.start.is_before(&other.end)
            && self.end.is_after(&other.start)
    }

    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if !self.is_intersecting(other) {
            return None;
        }
        let start = if self.start.is_before(&other.start) {
            other.start.clone()
        } else {
            self.start.clone()
        };
        let end = if self.end.is_after(&other.end) {
            other.end.clone()
        } else {
            self.end.clone()
        };
        Some(Range { start, end })
    }

    /// Parts of `self` not covered by `other`, in document order.
    pub fn difference(&self, other: &Range) -> Vec<Range> {
        if !self.is_intersecting(other) {
            return vec![self.clone()];
        }
        let mut parts = Vec::new();
        if self.start.is_before(&other.start) {
            parts.push(Range::new(self.start.clone(), other.start.clone()));
        }
        if other.end.is_before(&self.end) {
            parts.push(Range::new(other.end.clone(), self.end.clone()));
        }
        parts
    }

    /// Joins two ranges that touch or overlap.
    pub fn join(&self, other: &Range) -> Option<Range> {
        if self.start.root != other.start.root
            || self.end.is_before(&other.start)
            || other.end.is_before(&self.start)
        {
            return None;
        }
        let start = if other.start.is_before(&self.start) { &other.start } else { &self.start };
        let end = if other.end.is_after(&self.end) { &other.end } else { &self.end };
        Some(Range::new(start.clone(), end.clone()))
    }

    /// With `spread`, an insertion strictly inside the range splits it so the
    /// inserted content is excluded.
    pub fn transformed_by_insertion(
        &self,
        at: &Position,
        how_many: usize,
        spread: bool,
    ) -> Vec<Range> {
        if spread && self.contains_position(at) {
            return vec![
                Range::new(self.start.clone(), at.clone()),
                Range::new(
                    at.shifted_by(how_many as isize),
                    self.end
                        .transformed_by_insertion(at, how_many, Stickiness::ToNext),
                ),
            ];
        }
        if self.is_collapsed() {
            let position = self.start.transformed_by_insertion(at, how_many, Stickiness::ToNext);
            return vec![Range::collapsed(position)];
        }
        vec![Range::new(
            self.start.transformed_by_insertion(at, how_many, Stickiness::ToNext),
            self.end.transformed_by_insertion(at, how_many, Stickiness::ToPrevious),
        )]
    }

    /// `None` when the whole range was removed.
    pub fn transformed_by_deletion(&self, at: &Position, how_many: usize) -> Option<Range> {
        let start = self.start.transformed_by_deletion(at, how_many);
        let end = self.end.transformed_by_deletion(at, how_many);
        if start.is_none() && end.is_none() {
            return None;
        }
        Some(Range::new(
            start.unwrap_or_else(|| at.clone()),
            end.unwrap_or_else(|| at.clone()),
        ))
    }

    /// Splits the range when only a part of it is moved. Parts that stay are
    /// returned first (joined when they become adjacent), the moved part last.
    pub fn transformed_by_move(
        &self,
        source: &Position,
        how_many: usize,
        target: &Position,
    ) -> Vec<Range> {
        let moved = Range::from_offset(source.clone(), how_many);
        let moved_start = moved_range_start(source, how_many, target);

        if self.is_collapsed() {
            let position =
                self.start
                    .transformed_by_move(source, how_many, target, Stickiness::ToNext);
            return vec![Range::collapsed(position)];
        }

        if moved.contains_range(self) {
            return vec![Range::new(
                self.start.combined(source, &moved_start),
                self.end.combined(source, &moved_start),
            )];
        }

        let transform_kept = |range: &Range| {
            Range::new(
                range
                    .start
                    .transformed_by_move(source, how_many, target, Stickiness::ToNext),
                range
                    .end
                    .transformed_by_move(source, how_many, target, Stickiness::ToPrevious),
            )
        };

        let Some(common) = self.intersection(&moved) else {
            return vec![transform_kept(self)];
        };

        let kept: Vec<Range> = self.difference(&moved).iter().map(transform_kept).collect();
        let mut result: Vec<Range> = Vec::new();
        for range in kept {
            match result.last().and_then(|last: &Range| {
                (last.end == range.start).then(|| Range::new(last.start.clone(), range.end.clone()))
            }) {
                Some(joined) => {
                    result.pop();
                    result.push(joined);
                }
                None => result.push(range),
            }
        }
        result.push(Range::new(
            common.start.combined(source, &moved_start),
            common.end.combined(source, &moved_start),
        ));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(path: &[usize]) -> Position {
        Position::new("main", path.to_vec())
    }

    #[test]
    fn test_insertion_shifts_following_positions() {
        let p = pos(&[0, 3]);
        assert_eq!(p.transformed_by_insertion(&pos(&[0, 1]), 2, Stickiness::ToNext), pos(&[0, 5]));
        assert_eq!(p.transformed_by_insertion(&pos(&[0, 3]), 2, Stickiness::ToPrevious), pos(&[0, 3]));
        assert_eq!(p.transformed_by_insertion(&pos(&[0]), 1, Stickiness::ToNext), pos(&[1, 3]));
    }

    #[test]
    fn test_deletion_drops_positions_inside() {
        let p = pos(&[0, 3]);
        assert_eq!(p.transformed_by_deletion(&pos(&[0, 1]), 4), None);
        assert_eq!(p.transformed_by_deletion(&pos(&[0, 1]), 2), Some(pos(&[0, 1])));
        assert_eq!(pos(&[2, 1]).transformed_by_deletion(&pos(&[2]), 1), None);
    }

    #[test]
    fn test_move_follows_moved_content() {
        // "foobar": move [1,3) to the end (offset 6 before removal).
        let p = pos(&[0, 2]);
        let moved = p.transformed_by_move(&pos(&[0, 1]), 2, &pos(&[0, 6]), Stickiness::ToNext);
        assert_eq!(moved, pos(&[0, 5]));
    }

    #[test]
    fn test_range_split_by_partial_move() {
        // Range [2,4) in "foobar", then [1,3) moved to the end.
        let range = Range::new(pos(&[0, 2]), pos(&[0, 4]));
        let parts = range.transformed_by_move(&pos(&[0, 1]), 2, &pos(&[0, 6]));
        assert_eq!(
            parts,
            vec![
                Range::new(pos(&[0, 1]), pos(&[0, 2])),
                Range::new(pos(&[0, 5]), pos(&[0, 6])),
            ]
        );
    }

    #[test]
    fn test_spread_insertion_splits_range() {
        let range = Range::new(pos(&[0, 1]), pos(&[0, 4]));
        let parts = range.transformed_by_insertion(&pos(&[0, 2]), 3, true);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], Range::new(pos(&[0, 5]), pos(&[0, 7])));
    }
}
