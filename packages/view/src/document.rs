//! # View Document
//!
//! Arena holding every view node ever created. Removing a node only detaches
//! it, so a removed subtree can be re-attached later with its identity intact.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Index;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ViewError, ViewResult};
use crate::node::{HighlightDescriptor, ViewNode, ViewNodeId, ViewNodeKind};
use crate::writer::DowncastWriter;

/// `offset` is a child index for elements and a character index for text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewPosition {
    pub parent: ViewNodeId,
    pub offset: usize,
}

impl ViewPosition {
    pub fn new(parent: ViewNodeId, offset: usize) -> Self {
        Self { parent, offset }
    }

    pub fn shifted_by(&self, delta: isize) -> Self {
        Self {
            parent: self.parent,
            offset: (self.offset as isize + delta).max(0) as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewRange {
    pub start: ViewPosition,
    pub end: ViewPosition,
}

impl ViewRange {
    pub fn new(start: ViewPosition, end: ViewPosition) -> Self {
        Self { start, end }
    }

    pub fn collapsed(position: ViewPosition) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn is_flat(&self) -> bool {
        self.start.parent == self.end.parent
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSelection {
    pub ranges: Vec<ViewRange>,
    pub backward: bool,
}

impl ViewSelection {
    pub fn is_collapsed(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].is_collapsed()
    }

    pub fn first_position(&self) -> Option<ViewPosition> {
        self.ranges.first().map(|range| range.start)
    }
}

pub type AddHighlightFn = Rc<dyn Fn(&mut DowncastWriter<'_>, ViewNodeId, &HighlightDescriptor)>;
pub type RemoveHighlightFn = Rc<dyn Fn(&mut DowncastWriter<'_>, ViewNodeId, &str)>;

/// Custom highlight handling for an element. When present, highlight
/// converters hand styling to these hooks instead of wrapping text.
#[derive(Clone)]
pub struct HighlightHandler {
    pub add: AddHighlightFn,
    pub remove: RemoveHighlightFn,
}

impl fmt::Debug for HighlightHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HighlightHandler")
    }
}

#[derive(Debug, Default)]
pub struct ViewDocument {
    pub(crate) nodes: Vec<ViewNode>,
    roots: BTreeMap<String, ViewNodeId>,
    pub(crate) selection: ViewSelection,
    pub(crate) highlight_handlers: HashMap<ViewNodeId, HighlightHandler>,
}

impl Index<ViewNodeId> for ViewDocument {
    type Output = ViewNode;

    fn index(&self, id: ViewNodeId) -> &ViewNode {
        &self.nodes[id.0]
    }
}

impl ViewDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_root(&mut self, name: &str, tag: &str) -> ViewNodeId {
        let id = self.alloc(ViewNode::new(ViewNodeKind::Root, tag));
        self.roots.insert(name.to_string(), id);
        id
    }

    pub(crate) fn alloc(&mut self, node: ViewNode) -> ViewNodeId {
        self.nodes.push(node);
        ViewNodeId(self.nodes.len() - 1)
    }

    pub fn root(&self, name: &str) -> ViewResult<ViewNodeId> {
        self.roots
            .get(name)
            .copied()
            .ok_or_else(|| ViewError::RootNotFound(name.to_string()))
    }

    pub fn root_names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    pub fn get(&self, id: ViewNodeId) -> ViewResult<&ViewNode> {
        self.nodes.get(id.0).ok_or(ViewError::NodeNotFound(id))
    }

    pub fn parent(&self, id: ViewNodeId) -> Option<ViewNodeId> {
        self[id].parent
    }

    pub fn children(&self, id: ViewNodeId) -> &[ViewNodeId] {
        &self[id].children
    }

    pub fn index_in_parent(&self, id: ViewNodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self[parent].children.iter().position(|child| *child == id)
    }

    /// Ancestors of the node, nearest first.
    pub fn ancestors(&self, id: ViewNodeId) -> Vec<ViewNodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.parent(parent);
        }
        ancestors
    }

    pub fn top_most(&self, id: ViewNodeId) -> ViewNodeId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    pub fn is_attached(&self, id: ViewNodeId) -> bool {
        self[self.top_most(id)].kind == ViewNodeKind::Root
    }

    /// The node and all its descendants, in pre-order.
    pub fn descendants(&self, id: ViewNodeId) -> Vec<ViewNodeId> {
        let mut result = vec![id];
        for child in &self[id].children {
            result.extend(self.descendants(*child));
        }
        result
    }

    pub fn selection(&self) -> &ViewSelection {
        &self.selection
    }

    pub fn highlight_handler(&self, id: ViewNodeId) -> Option<&HighlightHandler> {
        self.highlight_handlers.get(&id)
    }

    pub fn custom_property(&self, id: ViewNodeId, key: &str) -> Option<&Value> {
        self[id].custom_properties.get(key)
    }

    pub fn position_before(&self, id: ViewNodeId) -> Option<ViewPosition> {
        let parent = self.parent(id)?;
        Some(ViewPosition::new(parent, self.index_in_parent(id)?))
    }

    pub fn position_after(&self, id: ViewNodeId) -> Option<ViewPosition> {
        self.position_before(id).map(|position| position.shifted_by(1))
    }

    pub fn range_on(&self, id: ViewNodeId) -> Option<ViewRange> {
        Some(ViewRange::new(self.position_before(id)?, self.position_after(id)?))
    }

    pub fn range_in(&self, id: ViewNodeId) -> ViewRange {
        ViewRange::new(
            ViewPosition::new(id, 0),
            ViewPosition::new(id, self[id].max_offset()),
        )
    }

    /// Same position expressed outside a text node when it is at one of
    /// its ends. Positions strictly inside text are returned unchanged.
    pub fn position_outside_text(&self, position: ViewPosition) -> ViewPosition {
        let node = &self[position.parent];
        if !node.is_text() {
            return position;
        }
        match (position.offset, self.position_before(position.parent)) {
            (0, Some(before)) => before,
            (offset, Some(before)) if offset >= node.max_offset() => before.shifted_by(1),
            _ => position,
        }
    }

    /// Same position expressed inside an adjacent text node, if there is
    /// one. Used to render carets inside text.
    pub fn position_in_text(&self, position: ViewPosition) -> ViewPosition {
        let parent = &self[position.parent];
        if parent.is_text() {
            return position;
        }
        if let Some(before) = position.offset.checked_sub(1).and_then(|i| parent.children.get(i)) {
            if self[*before].is_text() {
                return ViewPosition::new(*before, self[*before].max_offset());
            }
        }
        if let Some(after) = parent.children.get(position.offset) {
            if self[*after].is_text() {
                return ViewPosition::new(*after, 0);
            }
        }
        position
    }
}
