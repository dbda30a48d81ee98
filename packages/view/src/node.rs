//! View nodes stored in the [`ViewDocument`](crate::ViewDocument) arena.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default priority of attribute elements.
pub const DEFAULT_PRIORITY: u32 = 10;

pub type ViewAttributes = BTreeMap<String, String>;

/// Arena index. Two views of the same node always have the same id, so id
/// equality is node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewNodeId(pub usize);

impl fmt::Display for ViewNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewNodeKind {
    Root,
    Container,
    Attribute { priority: u32, id: Option<String> },
    /// Cannot have children.
    Empty,
    /// Not bound to model content; ignored by position mapping.
    Ui,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewNode {
    pub kind: ViewNodeKind,
    /// Tag name; empty for text.
    pub name: String,
    pub attributes: ViewAttributes,
    pub classes: BTreeSet<String>,
    pub styles: BTreeMap<String, String>,
    pub custom_properties: BTreeMap<String, Value>,
    /// Text content; empty for elements.
    pub data: String,
    pub children: Vec<ViewNodeId>,
    pub parent: Option<ViewNodeId>,
}

impl ViewNode {
    pub(crate) fn new(kind: ViewNodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes: ViewAttributes::new(),
            classes: BTreeSet::new(),
            styles: BTreeMap::new(),
            custom_properties: BTreeMap::new(),
            data: String::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == ViewNodeKind::Text
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, ViewNodeKind::Attribute { .. })
    }

    pub fn is_ui(&self) -> bool {
        self.kind == ViewNodeKind::Ui
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, ViewNodeKind::Container | ViewNodeKind::Root)
    }

    pub fn priority(&self) -> u32 {
        match self.kind {
            ViewNodeKind::Attribute { priority, .. } => priority,
            _ => DEFAULT_PRIORITY,
        }
    }

    pub fn element_id(&self) -> Option<&str> {
        match &self.kind {
            ViewNodeKind::Attribute { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    /// Child count for elements, character count for text.
    pub fn max_offset(&self) -> usize {
        if self.is_text() {
            self.data.chars().count()
        } else {
            self.children.len()
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Same kind, name, priority, id, attributes, classes and styles.
    /// Attribute elements with an id only compare ids.
    pub fn is_similar(&self, other: &ViewNode) -> bool {
        if self.is_attribute() && other.is_attribute() && (self.element_id().is_some() || other.element_id().is_some()) {
            return self.element_id() == other.element_id();
        }
        self.kind == other.kind
            && self.name == other.name
            && self.attributes == other.attributes
            && self.classes == other.classes
            && self.styles == other.styles
    }

    /// Shallow copy without children or parent.
    pub(crate) fn shallow_clone(&self) -> ViewNode {
        ViewNode {
            children: Vec::new(),
            parent: None,
            ..self.clone()
        }
    }

    pub(crate) fn set_attribute(&mut self, key: &str, value: &str) {
        match key {
            "class" => {
                self.classes = value.split_whitespace().map(str::to_string).collect();
            }
            "style" => {
                self.styles = parse_styles(value);
            }
            _ => {
                self.attributes.insert(key.to_string(), value.to_string());
            }
        }
    }

    pub(crate) fn remove_attribute(&mut self, key: &str) {
        match key {
            "class" => self.classes.clear(),
            "style" => self.styles.clear(),
            _ => {
                self.attributes.remove(key);
            }
        }
    }
}

/// Parses `color:red; font-weight: bold` into a map.
pub fn parse_styles(value: &str) -> BTreeMap<String, String> {
    value
        .split(';')
        .filter_map(|declaration| {
            let (key, value) = declaration.split_once(':')?;
            let (key, value) = (key.trim(), value.trim());
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// How a highlighted range is styled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HighlightDescriptor {
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attributes: ViewAttributes,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_parsing() {
        let styles = parse_styles("color:red; font-weight: bold;");
        assert_eq!(styles.get("color").map(String::as_str), Some("red"));
        assert_eq!(styles.get("font-weight").map(String::as_str), Some("bold"));
        assert_eq!(styles.len(), 2);
    }

    #[test]
    fn test_attribute_elements_with_id_compare_ids() {
        let a = ViewNode::new(
            ViewNodeKind::Attribute {
                priority: 10,
                id: Some("comment:1".into()),
            },
            "span",
        );
        let mut b = a.clone();
        b.classes.insert("other".into());
        assert!(a.is_similar(&b));
    }
}
