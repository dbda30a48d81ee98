//! # Model Nodes
//!
//! The model tree is made of elements and text nodes. Elements carry a stable
//! [`ElementId`] that survives moves (including trips through the graveyard),
//! so the mapper and the consumable ledger can key on it.
//!
//! Offsets inside a parent count characters for text and `1` for elements.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Attributes = BTreeMap<String, Value>;

/// Name used in event names and change entries for text content.
pub const TEXT_NAME: &str = "$text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(Element),
    Text(Text),
}

impl Node {
    pub fn text(data: impl Into<String>) -> Self {
        Node::Text(Text::new(data))
    }

    pub fn offset_size(&self) -> usize {
        match self {
            Node::Element(_) => 1,
            Node::Text(text) => text.len(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Element(el) => &el.name,
            Node::Text(_) => TEXT_NAME,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Node::Element(el) => &el.attributes,
            Node::Text(text) => &text.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            Node::Element(el) => &mut el.attributes,
            Node::Text(text) => &mut text.attributes,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(id: ElementId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self.normalize();
        self
    }

    pub fn max_offset(&self) -> usize {
        self.children.iter().map(Node::offset_size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Offset at which the child with the given index starts.
    pub fn offset_of_index(&self, index: usize) -> usize {
        self.children[..index.min(self.children.len())]
            .iter()
            .map(Node::offset_size)
            .sum()
    }

    /// Returns the index of the child containing `offset` and the offset
    /// inside that child. An offset at the very end yields `(len, 0)`.
    pub fn offset_to_index(&self, offset: usize) -> (usize, usize) {
        let mut start = 0;
        for (index, child) in self.children.iter().enumerate() {
            let size = child.offset_size();
            if offset < start + size {
                return (index, offset - start);
            }
            start += size;
        }
        (self.children.len(), offset.saturating_sub(start))
    }

    /// Node starting exactly at `offset`, if any.
    pub fn child_at_offset(&self, offset: usize) -> Option<&Node> {
        match self.offset_to_index(offset) {
            (index, 0) => self.children.get(index),
            _ => None,
        }
    }

    /// Makes sure a child boundary exists at `offset` (splitting a text
    /// node if needed) and returns the index of the child starting there.
    pub fn split_at(&mut self, offset: usize) -> usize {
        let (index, inner) = self.offset_to_index(offset);
        if inner == 0 {
            return index;
        }
        if let Some(Node::Text(text)) = self.children.get_mut(index) {
            let tail = text.split_off(inner);
            self.children.insert(index + 1, Node::Text(tail));
        }
        index + 1
    }

    /// Merges adjacent text nodes with equal attributes and drops empty ones.
    pub fn normalize(&mut self) {
        let mut merged: Vec<Node> = Vec::with_capacity(self.children.len());
        for child in self.children.drain(..) {
            match (merged.last_mut(), child) {
                (_, Node::Text(text)) if text.data.is_empty() => {}
                (Some(Node::Text(prev)), Node::Text(text)) if prev.attributes == text.attributes => {
                    prev.data.push_str(&text.data);
                }
                (_, child) => merged.push(child),
            }
        }
        self.children = merged;
    }

    pub fn find(&self, id: ElementId) -> Option<&Element> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter()
            .filter_map(Node::as_element)
            .find_map(|child| child.find(id))
    }

    /// Offset path (relative to `self`) of the element with the given id.
    pub fn path_to(&self, id: ElementId) -> Option<Vec<usize>> {
        if self.id == id {
            return Some(Vec::new());
        }
        let mut offset = 0;
        for child in &self.children {
            if let Node::Element(el) = child {
                if let Some(mut rest) = el.path_to(id) {
                    rest.insert(0, offset);
                    return Some(rest);
                }
            }
            offset += child.offset_size();
        }
        None
    }

    /// Ids of this element and every element below it.
    pub fn descendant_ids(&self) -> Vec<ElementId> {
        let mut ids = vec![self.id];
        for child in self.children.iter().filter_map(Node::as_element) {
            ids.extend(child.descendant_ids());
        }
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub data: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Text {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.data.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Splits at a character offset, keeping the head in `self`.
    pub fn split_off(&mut self, offset: usize) -> Text {
        let byte = byte_index(&self.data, offset);
        Text {
            data: self.data.split_off(byte),
            attributes: self.attributes.clone(),
        }
    }
}

pub(crate) fn byte_index(s: &str, char_offset: usize) -> usize {
    s.char_indices()
        .nth(char_offset)
        .map(|(byte, _)| byte)
        .unwrap_or(s.len())
}

pub(crate) fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}
