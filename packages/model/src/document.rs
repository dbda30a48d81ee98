//! # Document
//!
//! Owns the roots (including the graveyard), the history, markers, the
//! document selection and the differ. [`Document::apply_operation`] is the
//! single place where the tree is mutated.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::differ::{ChangeEntry, DiffSource, Differ};
use crate::error::{ModelError, ModelResult};
use crate::history::History;
use crate::markers::Markers;
use crate::node::{char_slice, Attributes, Element, ElementId, Node, TEXT_NAME};
use crate::operation::{Operation, OperationKind};
use crate::position::{Position, Range, GRAVEYARD};
use crate::selection::DocumentSelection;
use crate::transform::{transform_range, transform_range_joined};

/// Name of root elements.
pub const ROOT_NAME: &str = "$root";

type Roots = BTreeMap<String, Element>;

/// A node (or a part of a text node) met while walking a range.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Element {
        id: ElementId,
        name: String,
        attributes: Attributes,
        position: Position,
    },
    Text {
        data: String,
        attributes: Attributes,
        start: Position,
    },
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Element { name, .. } => name,
            Item::Text { .. } => TEXT_NAME,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Item::Element { attributes, .. } | Item::Text { attributes, .. } => attributes,
        }
    }

    pub fn element_id(&self) -> Option<ElementId> {
        match self {
            Item::Element { id, .. } => Some(*id),
            Item::Text { .. } => None,
        }
    }

    pub fn offset_size(&self) -> usize {
        match self {
            Item::Element { .. } => 1,
            Item::Text { data, .. } => data.chars().count(),
        }
    }

    pub fn start(&self) -> &Position {
        match self {
            Item::Element { position, .. } => position,
            Item::Text { start, .. } => start,
        }
    }

    /// Flat range the item occupies in its parent.
    pub fn range(&self) -> Range {
        Range::from_offset(self.start().clone(), self.offset_size())
    }
}

fn resolve<'a>(roots: &'a Roots, root: &str, path: &[usize]) -> ModelResult<&'a Element> {
    let mut element = roots
        .get(root)
        .ok_or_else(|| ModelError::RootNotFound(root.to_string()))?;
    for (depth, offset) in path.iter().enumerate() {
        element = match element.child_at_offset(*offset) {
            Some(Node::Element(child)) => child,
            _ => {
                return Err(ModelError::InvalidPath {
                    root: root.to_string(),
                    path: path.to_vec(),
                    reason: format!("no element at depth {depth}"),
                })
            }
        };
    }
    Ok(element)
}

fn resolve_mut<'a>(roots: &'a mut Roots, root: &str, path: &[usize]) -> ModelResult<&'a mut Element> {
    let mut element = roots
        .get_mut(root)
        .ok_or_else(|| ModelError::RootNotFound(root.to_string()))?;
    for (depth, offset) in path.iter().enumerate() {
        let (index, inner) = element.offset_to_index(*offset);
        element = match element.children.get_mut(index) {
            Some(Node::Element(child)) if inner == 0 => child,
            _ => {
                return Err(ModelError::InvalidPath {
                    root: root.to_string(),
                    path: path.to_vec(),
                    reason: format!("no element at depth {depth}"),
                })
            }
        };
    }
    Ok(element)
}

fn check_offset(parent: &Element, position: &Position) -> ModelResult<()> {
    if position.offset() > parent.max_offset() {
        return Err(ModelError::InvalidPath {
            root: position.root.clone(),
            path: position.path.clone(),
            reason: format!("offset exceeds parent size {}", parent.max_offset()),
        });
    }
    Ok(())
}

#[derive(Debug)]
pub struct Document {
    roots: Roots,
    history: History,
    markers: Markers,
    selection: DocumentSelection,
    differ: Differ,
    next_id: u64,
}

impl Document {
    pub fn new<S: AsRef<str>>(root_names: &[S]) -> Self {
        let mut document = Self {
            roots: Roots::new(),
            history: History::new(),
            markers: Markers::default(),
            selection: DocumentSelection::default(),
            differ: Differ::default(),
            next_id: 0,
        };
        for name in root_names.iter().map(|name| name.as_ref()).chain([GRAVEYARD]) {
            let root = document.create_element(ROOT_NAME);
            document.roots.insert(name.to_string(), root);
        }
        document
    }

    /// Creates a detached element with a fresh id.
    pub fn create_element(&mut self, name: impl Into<String>) -> Element {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        Element::new(id, name)
    }

    pub fn version(&self) -> u64 {
        self.history.version()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn selection(&self) -> &DocumentSelection {
        &self.selection
    }

    pub(crate) fn selection_mut(&mut self) -> &mut DocumentSelection {
        &mut self.selection
    }

    /// Names of the editable roots.
    pub fn root_names(&self) -> impl Iterator<Item = &str> {
        self.roots
            .keys()
            .map(String::as_str)
            .filter(|name| *name != GRAVEYARD)
    }

    pub fn root(&self, name: &str) -> ModelResult<&Element> {
        resolve(&self.roots, name, &[])
    }

    /// Element whose inside is addressed by `path` (empty path: the root).
    pub fn element_at(&self, root: &str, path: &[usize]) -> ModelResult<&Element> {
        resolve(&self.roots, root, path)
    }

    pub fn parent_of(&self, position: &Position) -> ModelResult<&Element> {
        resolve(&self.roots, &position.root, position.parent_path())
    }

    pub fn node_after(&self, position: &Position) -> Option<&Node> {
        self.parent_of(position).ok()?.child_at_offset(position.offset())
    }

    /// The element right after `position`, if there is one.
    pub fn element_after(&self, position: &Position) -> Option<&Element> {
        self.node_after(position).and_then(Node::as_element)
    }

    /// Node containing the offset right before `position`.
    pub fn node_before(&self, position: &Position) -> Option<&Node> {
        let offset = position.offset().checked_sub(1)?;
        let parent = self.parent_of(position).ok()?;
        let (index, _) = parent.offset_to_index(offset);
        parent.children.get(index)
    }

    /// Node containing the offset right after `position`.
    pub fn node_at(&self, position: &Position) -> Option<&Node> {
        let parent = self.parent_of(position).ok()?;
        let (index, _) = parent.offset_to_index(position.offset());
        parent.children.get(index)
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.roots.values().find_map(|root| root.find(id))
    }

    /// Position right before the element. `None` for roots and unknown ids.
    pub fn position_before(&self, id: ElementId) -> Option<Position> {
        let (root, path) = self.locate(id)?;
        (!path.is_empty()).then(|| Position::new(root, path))
    }

    pub fn root_name_of(&self, id: ElementId) -> Option<&str> {
        self.roots
            .iter()
            .find(|(_, root)| root.id == id)
            .map(|(name, _)| name.as_str())
    }

    /// Range covering the inside of the element.
    pub fn range_in(&self, id: ElementId) -> Option<Range> {
        let (root, path) = self.locate(id)?;
        let element = self.element(id)?;
        let mut start = path.clone();
        start.push(0);
        let mut end = path;
        end.push(element.max_offset());
        Some(Range::new(Position::new(root.clone(), start), Position::new(root, end)))
    }

    /// Range `[before, after]` of the element in its parent.
    pub fn range_on(&self, id: ElementId) -> Option<Range> {
        self.position_before(id)
            .map(|position| Range::from_offset(position, 1))
    }

    /// Attributes of the text node right before `position`, or right after
    /// it when there is no text before.
    pub fn text_attributes_at(&self, position: &Position) -> Attributes {
        let text_before = self.node_before(position).and_then(|node| match node {
            Node::Text(text) => Some(text.attributes.clone()),
            Node::Element(_) => None,
        });
        text_before
            .or_else(|| match self.node_at(position) {
                Some(Node::Text(text)) => Some(text.attributes.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Selection attributes: explicitly set ones, or inherited from the text
    /// around the selection focus.
    pub fn selection_attributes(&self) -> Attributes {
        if let Some(explicit) = self.selection.explicit_attributes() {
            return explicit.clone();
        }
        match self.selection.focus() {
            Some(focus) if self.selection.is_collapsed() => self.text_attributes_at(focus),
            Some(_) => self
                .selection
                .first_range()
                .and_then(|range| {
                    self.items(range, false)
                        .into_iter()
                        .find(|item| matches!(item, Item::Text { .. }))
                })
                .map(|item| item.attributes().clone())
                .unwrap_or_default(),
            None => Attributes::new(),
        }
    }

    pub fn selection_attribute(&self, key: &str) -> Option<Value> {
        self.selection_attributes().get(key).cloned()
    }

    /// Items inside `range` in document order. Deep walks yield an element
    /// before its contents; shallow walks stay in the start's parent.
    pub fn items(&self, range: &Range, shallow: bool) -> Vec<Item> {
        let mut items = Vec::new();
        let Ok(root) = self.root(range.root()) else {
            return items;
        };
        if shallow {
            if let Ok(parent) = self.parent_of(&range.start) {
                let inside = range.start.with_offset(0);
                collect_items(parent, &inside, range, false, &mut items);
            }
            return items;
        }
        let inside = Position::new(range.root(), vec![0]);
        collect_items(root, &inside, range, true, &mut items);
        items
    }

    /// Minimal list of flat ranges covering `range`.
    pub fn flat_ranges(&self, range: &Range) -> ModelResult<Vec<Range>> {
        if range.is_flat() {
            return Ok(if range.is_collapsed() { Vec::new() } else { vec![range.clone()] });
        }
        let (start, end) = (&range.start, &range.end);
        let max_common = start.depth().min(end.depth());
        let common = (0..max_common)
            .take_while(|&i| start.path[i] == end.path[i])
            .count();

        let mut ranges = Vec::new();
        let mut position = start.clone();
        while position.path.len() > common + 1 {
            let parent = self.parent_of(&position)?;
            let parent_end = position.with_offset(parent.max_offset());
            if position != parent_end {
                ranges.push(Range::new(position.clone(), parent_end));
            }
            position = position.after_parent().ok_or(ModelError::RangeNotFlat)?;
        }
        let end_at_common = Position::new(end.root.clone(), end.path[..=common].to_vec());
        if position.is_before(&end_at_common) {
            ranges.push(Range::new(position, end_at_common));
        }
        for level in common + 1..end.path.len() {
            let mut inner_start = end.path[..level].to_vec();
            inner_start.push(0);
            let inner_end = end.path[..=level].to_vec();
            if end.path[level] > 0 {
                ranges.push(Range::new(
                    Position::new(end.root.clone(), inner_start),
                    Position::new(end.root.clone(), inner_end),
                ));
            }
        }
        Ok(ranges)
    }

    pub fn changes(&self) -> Vec<ChangeEntry> {
        self.differ.changes(self)
    }

    pub fn differ(&self) -> &Differ {
        &self.differ
    }

    pub fn reset_differ(&mut self) {
        self.differ.reset();
    }

    pub fn has_changes(&self) -> bool {
        !self.differ.is_empty()
    }
}

fn collect_items(parent: &Element, inside: &Position, range: &Range, deep: bool, items: &mut Vec<Item>) {
    let mut offset = 0;
    for child in &parent.children {
        let size = child.offset_size();
        let start = inside.with_offset(offset);
        let end = inside.with_offset(offset + size);
        offset += size;
        if !start.is_before(&range.end) {
            break;
        }
        match child {
            Node::Text(text) => {
                if !end.is_after(&range.start) {
                    continue;
                }
                let from = if range.start.has_same_parent_as(&start) && range.start.is_after(&start) {
                    range.start.offset() - start.offset()
                } else {
                    0
                };
                let to = if range.end.has_same_parent_as(&end) && range.end.is_before(&end) {
                    range.end.offset() - start.offset()
                } else {
                    size
                };
                if from < to {
                    items.push(Item::Text {
                        data: char_slice(&text.data, from, to),
                        attributes: text.attributes.clone(),
                        start: start.with_offset(start.offset() + from),
                    });
                }
            }
            Node::Element(element) => {
                if !start.is_before(&range.start) {
                    items.push(Item::Element {
                        id: element.id,
                        name: element.name.clone(),
                        attributes: element.attributes.clone(),
                        position: start.clone(),
                    });
                }
                if deep && end.is_after(&range.start) {
                    collect_items(element, &start.child(0), range, deep, items);
                }
            }
        }
    }
}

impl DiffSource for Document {
    fn element(&self, id: ElementId) -> Option<&Element> {
        Document::element(self, id)
    }

    fn locate(&self, id: ElementId) -> Option<(String, Vec<usize>)> {
        self.roots
            .iter()
            .find_map(|(name, root)| root.path_to(id).map(|path| (name.clone(), path)))
    }

    fn ancestor_ids(&self, id: ElementId) -> Vec<ElementId> {
        let Some((root, path)) = self.locate(id) else {
            return Vec::new();
        };
        (0..path.len())
            .filter_map(|len| self.element_at(&root, &path[..len]).ok().map(|el| el.id))
            .collect()
    }
}

impl Document {
    /// Applies a document operation at the current version and records it
    /// in the history.
    pub fn apply_operation(&mut self, operation: &Operation) -> ModelResult<()> {
        let version = self.version();
        if operation.base_version != Some(version) {
            return Err(ModelError::VersionMismatch {
                expected: version,
                found: operation.base_version,
            });
        }
        self.buffer_for_differ(operation)?;
        self.apply_to_tree(operation)?;
        self.update_markers(operation);
        self.update_selection(operation);
        debug!(
            operation = operation.type_name(),
            version, "Applied operation"
        );
        self.history.add_operation(operation.clone());
        Ok(())
    }

    fn buffer_for_differ(&mut self, operation: &Operation) -> ModelResult<()> {
        let mut parents: Vec<Position> = Vec::new();
        match &operation.kind {
            OperationKind::Insert { position, .. } => {
                parents.push(position.clone());
            }
            OperationKind::Rename { position, .. } => {
                if let Some(renamed) = self.element_after(position).map(|element| element.id) {
                    self.differ.buffer_refresh(renamed);
                }
                parents.push(position.clone());
            }
            OperationKind::Move { source, target, .. } => {
                parents.push(source.clone());
                parents.push(target.clone());
            }
            OperationKind::Attribute { range, .. } => {
                parents.extend(self.flat_ranges(range)?.into_iter().map(|flat| flat.start));
            }
            OperationKind::Marker {
                name,
                old_range,
                new_range,
                ..
            } => {
                self.differ
                    .buffer_marker_change(name, old_range.clone(), new_range.clone(), false);
            }
            OperationKind::NoOp => {}
        }
        for position in parents {
            let parent = resolve(&self.roots, &position.root, position.parent_path())?;
            self.differ.buffer_parent(parent);
        }
        Ok(())
    }

    fn apply_to_tree(&mut self, operation: &Operation) -> ModelResult<()> {
        match &operation.kind {
            OperationKind::Insert { position, nodes } => {
                let parent = resolve_mut(&mut self.roots, &position.root, position.parent_path())?;
                check_offset(parent, position)?;
                insert_nodes(parent, position.offset(), nodes.clone());
            }
            OperationKind::Move {
                source,
                how_many,
                target,
            } => {
                let moved = Range::from_offset(source.clone(), *how_many);
                let source_parent = resolve(&self.roots, &source.root, source.parent_path())?;
                check_offset(source_parent, &moved.end)?;
                let target_after = target
                    .transformed_by_deletion(source, *how_many)
                    .ok_or(ModelError::MoveIntoItself)?;
                let target_parent = resolve(&self.roots, &target.root, target.parent_path())?;
                check_offset(target_parent, target)?;

                let source_parent = resolve_mut(&mut self.roots, &source.root, source.parent_path())?;
                let nodes = take_nodes(source_parent, source.offset(), *how_many);
                let target_parent =
                    resolve_mut(&mut self.roots, &target_after.root, target_after.parent_path())?;
                insert_nodes(target_parent, target_after.offset(), nodes);
            }
            OperationKind::Attribute {
                range,
                key,
                new_value,
                ..
            } => {
                for flat in self.flat_ranges(range)? {
                    let parent = resolve_mut(&mut self.roots, &flat.start.root, flat.start.parent_path())?;
                    check_offset(parent, &flat.end)?;
                    let from = parent.split_at(flat.start.offset());
                    let to = parent.split_at(flat.end.offset());
                    for child in &mut parent.children[from..to] {
                        match new_value {
                            Some(value) => {
                                child.attributes_mut().insert(key.clone(), value.clone());
                            }
                            None => {
                                child.attributes_mut().remove(key);
                            }
                        }
                    }
                    parent.normalize();
                }
            }
            OperationKind::Rename {
                position,
                old_name,
                new_name,
            } => {
                let parent = resolve_mut(&mut self.roots, &position.root, position.parent_path())?;
                let (index, inner) = parent.offset_to_index(position.offset());
                match parent.children.get_mut(index) {
                    Some(Node::Element(element)) if inner == 0 && element.name == *old_name => {
                        element.name = new_name.clone();
                    }
                    other => {
                        return Err(ModelError::RenameMismatch {
                            expected: old_name.clone(),
                            found: other.map(|node| node.name().to_string()).unwrap_or_default(),
                        })
                    }
                }
            }
            OperationKind::Marker { name, new_range, affects_data, .. } => match new_range {
                Some(range) => {
                    self.markers.set(name, range.clone(), *affects_data);
                }
                None => {
                    self.markers.remove(name);
                }
            },
            OperationKind::NoOp => {}
        }
        Ok(())
    }

    fn update_markers(&mut self, operation: &Operation) {
        if matches!(operation.kind, OperationKind::Marker { .. } | OperationKind::NoOp) {
            return;
        }
        let mut changes = Vec::new();
        for marker in self.markers.iter_mut() {
            let old = marker.range.clone();
            let new = transform_range_joined(&old, operation);
            let content_changed = changes_content_of(operation, &old);
            if new != old || content_changed {
                marker.range = new.clone();
                changes.push((marker.name.clone(), old, new, content_changed));
            }
        }
        for (name, old, new, content_changed) in changes {
            self.differ
                .buffer_marker_change(&name, Some(old), Some(new), content_changed);
        }
    }

    fn update_selection(&mut self, operation: &Operation) {
        let ranges: Vec<Range> = self
            .selection
            .ranges()
            .iter()
            .map(|range| {
                let transformed = transform_range(range, operation);
                match (&operation.kind, transformed.first()) {
                    (OperationKind::Move { source, target, .. }, Some(first))
                        if target.is_in_graveyard() && first.is_in_graveyard() =>
                    {
                        warn!(?range, "Selection was removed, collapsing at removal position");
                        Range::collapsed(source.clone())
                    }
                    (_, Some(first)) => first.clone(),
                    (_, None) => range.clone(),
                }
            })
            .collect();
        self.selection.update_ranges(ranges);
    }
}

/// Whether the operation changes content strictly inside `range`.
fn changes_content_of(operation: &Operation, range: &Range) -> bool {
    match &operation.kind {
        OperationKind::Insert { position, .. } => range.contains_position(position),
        OperationKind::Move {
            source,
            how_many,
            target,
        } => {
            range.is_intersecting(&Range::from_offset(source.clone(), *how_many))
                || range.contains_position(target)
        }
        OperationKind::Attribute { range: changed, .. } => range.is_intersecting(changed),
        OperationKind::Rename { position, .. } => range.contains_position(position),
        OperationKind::Marker { .. } | OperationKind::NoOp => false,
    }
}

fn insert_nodes(parent: &mut Element, offset: usize, nodes: Vec<Node>) {
    let index = parent.split_at(offset);
    parent.children.splice(index..index, nodes);
    parent.normalize();
}

fn take_nodes(parent: &mut Element, offset: usize, how_many: usize) -> Vec<Node> {
    let from = parent.split_at(offset);
    let to = parent.split_at(offset + how_many);
    let nodes = parent.children.drain(from..to).collect();
    parent.normalize();
    nodes
}
