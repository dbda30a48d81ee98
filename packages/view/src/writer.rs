//! # Downcast Writer
//!
//! Every view mutation done by converters goes through this writer. Attribute
//! elements are broken and merged around insertions so that formatting stays
//! flat: `<strong>fo</strong>x<strong>o</strong>` rather than nested copies.

use serde_json::Value;
use tracing::trace;

use crate::document::{HighlightHandler, ViewDocument, ViewPosition, ViewRange};
use crate::error::{ViewError, ViewResult};
use crate::node::{ViewNode, ViewNodeId, ViewNodeKind};

fn byte_index(s: &str, char_offset: usize) -> usize {
    s.char_indices()
        .nth(char_offset)
        .map(|(byte, _)| byte)
        .unwrap_or(s.len())
}

pub struct DowncastWriter<'a> {
    document: &'a mut ViewDocument,
}

impl<'a> DowncastWriter<'a> {
    pub fn new(document: &'a mut ViewDocument) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &ViewDocument {
        self.document
    }

    fn create(&mut self, kind: ViewNodeKind, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        let mut node = ViewNode::new(kind, name);
        for (key, value) in attributes {
            node.set_attribute(key, value);
        }
        self.document.alloc(node)
    }

    pub fn create_text(&mut self, data: &str) -> ViewNodeId {
        let mut node = ViewNode::new(ViewNodeKind::Text, "");
        node.data = data.to_string();
        self.document.alloc(node)
    }

    pub fn create_container_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.create(ViewNodeKind::Container, name, attributes)
    }

    pub fn create_attribute_element(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        priority: u32,
        id: Option<&str>,
    ) -> ViewNodeId {
        let kind = ViewNodeKind::Attribute {
            priority,
            id: id.map(str::to_string),
        };
        self.create(kind, name, attributes)
    }

    pub fn create_empty_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.create(ViewNodeKind::Empty, name, attributes)
    }

    pub fn create_ui_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.create(ViewNodeKind::Ui, name, attributes)
    }

    /// Appends a child to a detached element being built.
    pub fn append_child(&mut self, parent: ViewNodeId, child: ViewNodeId) {
        let index = self.document[parent].children.len();
        self.insert_child(parent, index, child);
    }

    fn detach(&mut self, id: ViewNodeId) {
        if let Some(parent) = self.document.nodes[id.0].parent.take() {
            self.document.nodes[parent.0].children.retain(|child| *child != id);
        }
    }

    fn insert_child(&mut self, parent: ViewNodeId, index: usize, child: ViewNodeId) {
        self.detach(child);
        let children = &mut self.document.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.document.nodes[child.0].parent = Some(parent);
    }

    fn check_position(&self, position: ViewPosition) -> ViewResult<()> {
        let node = self.document.get(position.parent)?;
        if position.offset > node.max_offset() {
            return Err(ViewError::InvalidPosition {
                parent: position.parent,
                offset: position.offset,
            });
        }
        Ok(())
    }

    /// Splits a text node at the position. Positions at text edges are moved
    /// out of the text without splitting.
    fn break_text(&mut self, position: ViewPosition) -> ViewResult<ViewPosition> {
        if !self.document[position.parent].is_text() {
            return Ok(position);
        }
        let outside = self.document.position_outside_text(position);
        if outside != position {
            return Ok(outside);
        }
        let before = self
            .document
            .position_before(position.parent)
            .ok_or(ViewError::Detached(position.parent))?;
        let text = &mut self.document.nodes[position.parent.0];
        let byte = byte_index(&text.data, position.offset);
        let tail = text.data.split_off(byte);
        let tail = self.create_text(&tail);
        self.insert_child(before.parent, before.offset + 1, tail);
        Ok(before.shifted_by(1))
    }

    fn is_container_like(&self, id: ViewNodeId) -> bool {
        let node = &self.document[id];
        node.is_container() || (node.parent.is_none() && !node.is_text())
    }

    fn break_attributes_inner(&mut self, position: ViewPosition, force_split_text: bool) -> ViewResult<ViewPosition> {
        self.check_position(position)?;
        let parent = &self.document[position.parent];
        match parent.kind {
            ViewNodeKind::Empty | ViewNodeKind::Ui => {
                return Err(ViewError::InvalidPosition {
                    parent: position.parent,
                    offset: position.offset,
                })
            }
            _ => {}
        }
        if parent.is_text() {
            let in_container = parent.parent.is_some_and(|p| self.is_container_like(p));
            if !force_split_text && in_container {
                return Ok(position);
            }
            let broken = self.break_text(position)?;
            return self.break_attributes_inner(broken, force_split_text);
        }
        if self.is_container_like(position.parent) {
            return Ok(position);
        }

        let element = position.parent;
        let length = self.document[element].children.len();
        let before = self
            .document
            .position_before(element)
            .ok_or(ViewError::Detached(element))?;
        let next = if position.offset == length {
            before.shifted_by(1)
        } else if position.offset == 0 {
            before
        } else {
            let clone = self.document[element].shallow_clone();
            let clone = self.document.alloc(clone);
            self.insert_child(before.parent, before.offset + 1, clone);
            let moved: Vec<ViewNodeId> = self.document[element].children[position.offset..].to_vec();
            for child in moved {
                self.append_child(clone, child);
            }
            before.shifted_by(1)
        };
        self.break_attributes_inner(next, force_split_text)
    }

    /// Breaks attribute elements so the position ends up directly in its
    /// container. Text directly in a container is not split.
    pub fn break_attributes(&mut self, position: ViewPosition) -> ViewResult<ViewPosition> {
        self.break_attributes_inner(position, false)
    }

    fn break_range(&mut self, range: ViewRange) -> ViewResult<ViewRange> {
        if range.is_collapsed() {
            let position = self.break_attributes_inner(range.start, true)?;
            return Ok(ViewRange::collapsed(position));
        }
        let mut end = self.break_attributes_inner(range.end, true)?;
        let count = self.document[end.parent].children.len();
        let start = self.break_attributes_inner(range.start, true)?;
        end.offset += self.document[end.parent].children.len() - count;
        Ok(ViewRange::new(start, end))
    }

    /// Merges similar attribute elements and text nodes meeting at the
    /// position. Returns the equivalent position after merging.
    pub fn merge_attributes(&mut self, position: ViewPosition) -> ViewPosition {
        let parent = &self.document[position.parent];
        if parent.is_text() {
            return position;
        }
        if parent.is_attribute() && parent.children.is_empty() {
            if let Some(before) = self.document.position_before(position.parent) {
                self.detach(position.parent);
                return self.merge_attributes(before);
            }
            return position;
        }
        let (Some(before), Some(after)) = (
            position.offset.checked_sub(1).and_then(|i| parent.children.get(i)).copied(),
            parent.children.get(position.offset).copied(),
        ) else {
            return position;
        };
        let (before_node, after_node) = (&self.document[before], &self.document[after]);
        if before_node.is_text() && after_node.is_text() {
            let offset = before_node.max_offset();
            let data = after_node.data.clone();
            self.document.nodes[before.0].data.push_str(&data);
            self.detach(after);
            return ViewPosition::new(before, offset);
        }
        if before_node.is_attribute() && after_node.is_attribute() && before_node.is_similar(after_node) {
            let count = before_node.children.len();
            let moved = after_node.children.clone();
            for child in moved {
                self.append_child(before, child);
            }
            self.detach(after);
            return self.merge_attributes(ViewPosition::new(before, count));
        }
        position
    }

    /// Inserts detached (or moved) nodes. Returns the range they occupy.
    pub fn insert(&mut self, position: ViewPosition, nodes: &[ViewNodeId]) -> ViewResult<ViewRange> {
        let only_ui = nodes.iter().all(|node| self.document[*node].is_ui());
        let insertion = if only_ui {
            self.check_position(position)?;
            self.break_text(position)?
        } else {
            self.break_attributes_inner(position, true)?
        };
        for (index, node) in nodes.iter().enumerate() {
            if *node == insertion.parent {
                return Err(ViewError::InvalidPosition {
                    parent: insertion.parent,
                    offset: insertion.offset,
                });
            }
            self.insert_child(insertion.parent, insertion.offset + index, *node);
        }
        let mut end = insertion.shifted_by(nodes.len() as isize);
        let start = self.merge_attributes(insertion);
        if start != insertion {
            end.offset -= 1;
        }
        let end = self.merge_attributes(end);
        trace!(count = nodes.len(), "Inserted view nodes");
        Ok(ViewRange::new(start, end))
    }

    /// Detaches the content of a range. The removed nodes stay in the arena.
    pub fn remove(&mut self, range: ViewRange) -> ViewResult<Vec<ViewNodeId>> {
        if range.is_collapsed() {
            return Ok(Vec::new());
        }
        let broken = self.break_range(range)?;
        if !broken.is_flat() {
            return Err(ViewError::RangeNotFlat);
        }
        let parent = broken.start.parent;
        let removed: Vec<ViewNodeId> =
            self.document[parent].children[broken.start.offset..broken.end.offset].to_vec();
        for node in &removed {
            self.detach(*node);
        }
        self.merge_attributes(broken.start);
        Ok(removed)
    }

    pub fn remove_node(&mut self, id: ViewNodeId) -> ViewResult<()> {
        if let Some(range) = self.document.range_on(id) {
            self.remove(range)?;
        }
        Ok(())
    }

    pub fn move_range(&mut self, source: ViewRange, target: ViewPosition) -> ViewResult<ViewRange> {
        let same_parent_after = target.parent == source.end.parent && target.offset >= source.end.offset;
        if same_parent_after {
            let parent = target.parent;
            let count_before = self.document[parent].children.len();
            let nodes = self.remove(source)?;
            let target = ViewPosition::new(
                parent,
                (target.offset + self.document[parent].children.len()).saturating_sub(count_before),
            );
            return self.insert(target, &nodes);
        }
        let nodes = self.remove(source)?;
        self.insert(target, &nodes)
    }

    /// Wraps the range in copies of `attribute`. A collapsed range gets an
    /// empty attribute element and the selection moves inside it when it
    /// was at that position.
    pub fn wrap(&mut self, range: ViewRange, attribute: ViewNodeId) -> ViewResult<ViewRange> {
        if !range.is_collapsed() {
            return self.wrap_range(range, attribute);
        }
        let position = self.wrap_position(range.start, attribute)?;
        let selection = &self.document.selection;
        if selection.is_collapsed() && selection.first_position() == Some(range.start) {
            self.set_selection(vec![ViewRange::collapsed(position)], false);
        }
        Ok(ViewRange::collapsed(position))
    }

    fn wrap_range(&mut self, range: ViewRange, attribute: ViewNodeId) -> ViewResult<ViewRange> {
        let broken = self.break_range(range)?;
        if !broken.is_flat() {
            return Err(ViewError::RangeNotFlat);
        }
        let wrapped = self.wrap_children(broken.start.parent, broken.start.offset, broken.end.offset, attribute);
        let start = self.merge_attributes(wrapped.start);
        let mut end = wrapped.end;
        if start != wrapped.start {
            end.offset -= 1;
        }
        let end = self.merge_attributes(end);
        Ok(ViewRange::new(start, end))
    }

    fn wrap_position(&mut self, position: ViewPosition, attribute: ViewNodeId) -> ViewResult<ViewPosition> {
        if self.document[attribute].is_similar(&self.document[position.parent]) {
            return Ok(self.document.position_in_text(position));
        }
        let position = self.break_text(position)?;
        let fake = self.create_attribute_element("$fake", &[], u32::MAX, Some("$fake"));
        self.insert_child(position.parent, position.offset, fake);
        self.wrap_range(ViewRange::new(position, position.shifted_by(1)), attribute)?;
        let Some(at) = self.document.position_before(fake) else {
            return Ok(position);
        };
        self.detach(fake);
        let parent = &self.document[at.parent];
        let before = at.offset.checked_sub(1).and_then(|i| parent.children.get(i)).copied();
        let after = parent.children.get(at.offset).copied();
        if let (Some(before), Some(after)) = (before, after) {
            if self.document[before].is_text() && self.document[after].is_text() {
                return Ok(self.merge_attributes(at));
            }
        }
        Ok(self.document.position_in_text(at))
    }

    /// Wrapper goes outside `other` when it has a lower priority (ties by name).
    fn should_be_outside(&self, wrapper: ViewNodeId, other: ViewNodeId) -> bool {
        let (a, b) = (&self.document[wrapper], &self.document[other]);
        match a.priority().cmp(&b.priority()) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => (&a.name, &a.attributes) < (&b.name, &b.attributes),
        }
    }

    fn can_be_joined(&self, a: ViewNodeId, b: ViewNodeId) -> bool {
        self.document[a].element_id() == self.document[b].element_id()
    }

    /// Adds the wrapper's attributes to an existing, compatible attribute element.
    fn wrap_attribute_element(&mut self, wrapper: ViewNodeId, target: ViewNodeId) -> bool {
        if !self.can_be_joined(wrapper, target) {
            return false;
        }
        let (w, t) = (&self.document[wrapper], &self.document[target]);
        if w.name != t.name || w.priority() != t.priority() {
            return false;
        }
        let conflicting_attribute = w
            .attributes
            .iter()
            .any(|(key, value)| t.attributes.get(key).is_some_and(|other| other != value));
        let conflicting_style = w
            .styles
            .iter()
            .any(|(key, value)| t.styles.get(key).is_some_and(|other| other != value));
        if conflicting_attribute || conflicting_style {
            return false;
        }
        let w = w.clone();
        let t = &mut self.document.nodes[target.0];
        t.attributes.extend(w.attributes);
        t.classes.extend(w.classes);
        t.styles.extend(w.styles);
        true
    }

    /// Removes the wrapper's attributes from an attribute element having all of them.
    fn unwrap_attribute_element(&mut self, wrapper: ViewNodeId, target: ViewNodeId) -> bool {
        if !self.can_be_joined(wrapper, target) {
            return false;
        }
        let (w, t) = (&self.document[wrapper], &self.document[target]);
        if w.name != t.name || w.priority() != t.priority() {
            return false;
        }
        let has_all = w.attributes.iter().all(|(key, value)| t.attributes.get(key) == Some(value))
            && w.classes.iter().all(|class| t.classes.contains(class))
            && w.styles.iter().all(|(key, value)| t.styles.get(key) == Some(value));
        if !has_all {
            return false;
        }
        let w = w.clone();
        let t = &mut self.document.nodes[target.0];
        for key in w.attributes.keys() {
            t.attributes.remove(key);
        }
        for class in &w.classes {
            t.classes.remove(class);
        }
        for key in w.styles.keys() {
            t.styles.remove(key);
        }
        true
    }

    fn wrap_children(&mut self, parent: ViewNodeId, start: usize, mut end: usize, wrapper: ViewNodeId) -> ViewRange {
        let mut wrap_positions = Vec::new();
        let mut index = start;
        while index < end {
            let child = self.document[parent].children[index];
            let node = &self.document[child];
            let is_attribute = node.is_attribute();
            let wraps_directly = node.is_text() || matches!(node.kind, ViewNodeKind::Empty | ViewNodeKind::Ui);
            if is_attribute && self.wrap_attribute_element(wrapper, child) {
                wrap_positions.push(index);
            } else if wraps_directly || (is_attribute && self.should_be_outside(wrapper, child)) {
                let clone = self.document[wrapper].shallow_clone();
                let clone = self.document.alloc(clone);
                self.insert_child(parent, index, clone);
                self.append_child(clone, child);
                wrap_positions.push(index);
            } else if is_attribute {
                let count = self.document[child].children.len();
                self.wrap_children(child, 0, count, wrapper);
            }
            index += 1;
        }

        let mut offset_change = 0;
        for position in wrap_positions {
            let offset = position - offset_change;
            if offset == start {
                continue;
            }
            let at = ViewPosition::new(parent, offset);
            if self.merge_attributes(at) != at {
                offset_change += 1;
                end -= 1;
            }
        }
        ViewRange::new(ViewPosition::new(parent, start), ViewPosition::new(parent, end))
    }

    /// Removes `attribute` (or the matching part of its attributes) from
    /// attribute elements inside the range.
    pub fn unwrap(&mut self, range: ViewRange, attribute: ViewNodeId) -> ViewResult<ViewRange> {
        if range.is_collapsed() {
            return Ok(range);
        }
        let broken = self.break_range(range)?;
        if !broken.is_flat() {
            return Err(ViewError::RangeNotFlat);
        }
        let unwrapped = self.unwrap_children(broken.start.parent, broken.start.offset, broken.end.offset, attribute);
        let start = self.merge_attributes(unwrapped.start);
        let mut end = unwrapped.end;
        if start != unwrapped.start {
            end.offset -= 1;
        }
        let end = self.merge_attributes(end);
        Ok(ViewRange::new(start, end))
    }

    fn unwrap_children(&mut self, parent: ViewNodeId, start: usize, mut end: usize, wrapper: ViewNodeId) -> ViewRange {
        let mut unwrap_positions = Vec::new();
        let mut index = start;
        while index < end {
            let child = self.document[parent].children[index];
            if !self.document[child].is_attribute() {
                index += 1;
                continue;
            }
            if self.document[child].is_similar(&self.document[wrapper]) {
                let inner = self.document[child].children.clone();
                let count = inner.len();
                self.detach(child);
                for (offset, node) in inner.into_iter().enumerate() {
                    self.insert_child(parent, index + offset, node);
                }
                unwrap_positions.push(index);
                unwrap_positions.push(index + count);
                index += count;
                end = end + count - 1;
                continue;
            }
            if self.unwrap_attribute_element(wrapper, child) {
                unwrap_positions.push(index);
                unwrap_positions.push(index + 1);
                index += 1;
                continue;
            }
            let count = self.document[child].children.len();
            self.unwrap_children(child, 0, count, wrapper);
            index += 1;
        }

        let mut offset_change = 0;
        for position in unwrap_positions {
            let offset = position - offset_change;
            if offset == start || offset == end {
                continue;
            }
            let at = ViewPosition::new(parent, offset);
            if self.merge_attributes(at) != at {
                offset_change += 1;
                end -= 1;
            }
        }
        ViewRange::new(ViewPosition::new(parent, start), ViewPosition::new(parent, end))
    }

    /// Replaces an element with its children.
    pub fn unwrap_element(&mut self, id: ViewNodeId) -> ViewResult<()> {
        let before = self.document.position_before(id).ok_or(ViewError::Detached(id))?;
        let children = self.document[id].children.clone();
        let count = children.len();
        self.detach(id);
        for (offset, child) in children.into_iter().enumerate() {
            self.insert_child(before.parent, before.offset + offset, child);
        }
        let end = self.merge_attributes(before.shifted_by(count as isize));
        if end.parent == before.parent {
            self.merge_attributes(before);
        }
        Ok(())
    }

    pub fn set_attribute(&mut self, key: &str, value: &str, id: ViewNodeId) {
        self.document.nodes[id.0].set_attribute(key, value);
    }

    pub fn remove_attribute(&mut self, key: &str, id: ViewNodeId) {
        self.document.nodes[id.0].remove_attribute(key);
    }

    pub fn add_class(&mut self, classes: &[&str], id: ViewNodeId) {
        let node = &mut self.document.nodes[id.0];
        node.classes.extend(classes.iter().map(|class| class.to_string()));
    }

    pub fn remove_class(&mut self, classes: &[&str], id: ViewNodeId) {
        let node = &mut self.document.nodes[id.0];
        for class in classes {
            node.classes.remove(*class);
        }
    }

    pub fn set_style(&mut self, key: &str, value: &str, id: ViewNodeId) {
        self.document.nodes[id.0]
            .styles
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove_style(&mut self, key: &str, id: ViewNodeId) {
        self.document.nodes[id.0].styles.remove(key);
    }

    pub fn set_custom_property(&mut self, key: &str, value: Value, id: ViewNodeId) {
        self.document.nodes[id.0]
            .custom_properties
            .insert(key.to_string(), value);
    }

    pub fn set_highlight_handler(&mut self, id: ViewNodeId, handler: HighlightHandler) {
        self.document.highlight_handlers.insert(id, handler);
    }

    pub fn set_selection(&mut self, ranges: Vec<ViewRange>, backward: bool) {
        self.document.selection.ranges = ranges;
        self.document.selection.backward = backward;
    }
}
