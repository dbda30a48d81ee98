//! Minimal schema: which element names exist and which of them accept text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaItem {
    #[serde(default)]
    pub allows_text: bool,
    #[serde(default)]
    pub is_object: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    items: HashMap<String, SchemaItem>,
}

impl Schema {
    pub fn register(&mut self, name: impl Into<String>, item: SchemaItem) {
        self.items.insert(name.into(), item);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn item(&self, name: &str) -> Option<&SchemaItem> {
        self.items.get(name)
    }

    /// Unregistered names do not accept text.
    pub fn allows_text(&self, name: &str) -> bool {
        self.items.get(name).is_some_and(|item| item.allows_text)
    }

    pub fn is_object(&self, name: &str) -> bool {
        self.items.get(name).is_some_and(|item| item.is_object)
    }
}
