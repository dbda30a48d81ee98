//! # Consumables
//!
//! Ledger of what is still waiting to be converted in one conversion call.
//! Converters test and consume values before touching the view, so two
//! converters never render the same aspect of the same item.

use std::collections::HashMap;

use scribe_model::{ElementId, Item, Range};
use serde::{Deserialize, Serialize};

use crate::conversion_api::ConversionItem;

/// Identity of a convertible thing. Text is identified by the range it
/// covers since text proxies have no identity of their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConsumableItem {
    Element(ElementId),
    Text(Range),
    /// A whole marker range consumed at once.
    Range(Range),
    Selection,
}

impl From<&Item> for ConsumableItem {
    fn from(item: &Item) -> Self {
        match item {
            Item::Element { id, .. } => ConsumableItem::Element(*id),
            Item::Text { .. } => ConsumableItem::Text(item.range()),
        }
    }
}

impl From<&ConversionItem> for ConsumableItem {
    fn from(item: &ConversionItem) -> Self {
        match item {
            ConversionItem::Item(item) => item.into(),
            ConversionItem::Range(range) => ConsumableItem::Range(range.clone()),
            ConversionItem::Selection => ConsumableItem::Selection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsumableKey {
    Insert,
    Attribute(String),
    AddMarker(String),
    Selection,
}

impl ConsumableKey {
    pub fn attribute(key: impl Into<String>) -> Self {
        ConsumableKey::Attribute(key.into())
    }

    pub fn add_marker(name: impl Into<String>) -> Self {
        ConsumableKey::AddMarker(name.into())
    }
}

#[derive(Debug, Default)]
pub struct Consumables {
    items: HashMap<ConsumableItem, HashMap<ConsumableKey, bool>>,
}

impl Consumables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value as waiting for conversion. Re-adding a consumed
    /// value makes it consumable again.
    pub fn add(&mut self, item: impl Into<ConsumableItem>, key: ConsumableKey) {
        self.items.entry(item.into()).or_default().insert(key, true);
    }

    /// `None` when the value was never added, otherwise whether it can
    /// still be consumed.
    pub fn test(&self, item: impl Into<ConsumableItem>, key: &ConsumableKey) -> Option<bool> {
        self.items.get(&item.into())?.get(key).copied()
    }

    pub fn can_consume(&self, item: impl Into<ConsumableItem>, key: &ConsumableKey) -> bool {
        self.test(item, key).unwrap_or(false)
    }

    /// Marks the value as converted. Returns `false`, changing nothing, when
    /// it was already consumed or never added.
    pub fn consume(&mut self, item: impl Into<ConsumableItem>, key: &ConsumableKey) -> bool {
        match self.items.get_mut(&item.into()).and_then(|keys| keys.get_mut(key)) {
            Some(available) if *available => {
                *available = false;
                true
            }
            _ => false,
        }
    }

    /// Makes a consumed value available again. `None` when it was never added.
    pub fn revert(&mut self, item: impl Into<ConsumableItem>, key: &ConsumableKey) -> Option<bool> {
        let available = self.items.get_mut(&item.into())?.get_mut(key)?;
        let was_consumed = !*available;
        *available = true;
        Some(was_consumed)
    }

    /// Consumes all values or none of them.
    pub fn consume_all(&mut self, item: impl Into<ConsumableItem>, keys: &[ConsumableKey]) -> bool {
        let item = item.into();
        if !keys.iter().all(|key| self.can_consume(item.clone(), key)) {
            return false;
        }
        for key in keys {
            self.consume(item.clone(), key);
        }
        true
    }
}
