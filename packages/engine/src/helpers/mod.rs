//! # Downcast Helpers
//!
//! Declarative converter registration on top of the dispatcher, plus the
//! converter factories it is built from. Factories are public so custom
//! registrations can reuse them directly.

mod attribute;
mod element;
mod marker;

use std::collections::BTreeMap;

use scribe_model::{Item, Position};
use scribe_view::{DowncastWriter, ViewDocument, ViewNodeId, ViewRange, DEFAULT_PRIORITY};
use serde::{Deserialize, Serialize};

use crate::consumable::ConsumableKey;
use crate::conversion_api::{ConversionApi, InsertData, RemoveData};
use crate::dispatcher::DowncastDispatcher;
use crate::emitter::{EventInfo, Priority};
use crate::error::ConversionResult;
use crate::selection::{clear_attributes, convert_collapsed_selection, convert_range_selection};

pub use attribute::{
    change_attribute, wrap, AttributeCreator, AttributeElementCreator, AttributeElementView,
    AttributeModel, AttributeToAttribute, AttributeToElement, AttributeView, ViewAttribute,
    ViewAttributeValue,
};
pub use element::{
    create_slot, insert_element, insert_structure, reinsert_or_convert_node, ElementCreator,
    ElementToElement, ElementToStructure, ElementView, ModelConfig, Slot, SlotFilter, Structure,
    StructureCreator,
};
pub use marker::{
    highlight_element, highlight_text, insert_marker_data, insert_ui_element, remove_highlight,
    remove_marker_data, remove_ui_element, HighlightCreator, HighlightView, MarkerDataCreator,
    MarkerDataView, MarkerElementCreator, MarkerToData, MarkerToElement, MarkerToHighlight,
};

/// Static description of a view element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewElementDefinition {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub styles: BTreeMap<String, String>,
    /// Only used for attribute elements.
    #[serde(default)]
    pub priority: Option<u32>,
}

impl From<&str> for ViewElementDefinition {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl ViewElementDefinition {
    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_style(mut self, key: &str, value: &str) -> Self {
        self.styles.insert(key.to_string(), value.to_string());
        self
    }

    fn decorate(&self, writer: &mut DowncastWriter<'_>, node: ViewNodeId) -> ViewNodeId {
        let classes: Vec<&str> = self.classes.iter().map(String::as_str).collect();
        if !classes.is_empty() {
            writer.add_class(&classes, node);
        }
        for (key, value) in &self.styles {
            writer.set_style(key, value, node);
        }
        node
    }

    fn attribute_pairs(&self) -> Vec<(&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect()
    }

    pub fn create_container(&self, writer: &mut DowncastWriter<'_>) -> ViewNodeId {
        let node = writer.create_container_element(&self.name, &self.attribute_pairs());
        self.decorate(writer, node)
    }

    pub fn create_attribute(&self, writer: &mut DowncastWriter<'_>) -> ViewNodeId {
        let priority = self.priority.unwrap_or(DEFAULT_PRIORITY);
        let node = writer.create_attribute_element(&self.name, &self.attribute_pairs(), priority, None);
        self.decorate(writer, node)
    }

    pub fn create_ui(&self, writer: &mut DowncastWriter<'_>) -> ViewNodeId {
        let node = writer.create_ui_element(&self.name, &self.attribute_pairs());
        self.decorate(writer, node)
    }
}

/// Inserts model text as view text.
pub fn insert_text() -> impl Fn(&mut EventInfo, &InsertData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    |_, data, api| {
        let Item::Text { data: text, .. } = &data.item else {
            return Ok(());
        };
        if !api.consumable.consume(&data.item, &ConsumableKey::Insert) {
            return Ok(());
        }
        let position = api.to_view_position(&data.range.start)?;
        let node = api.writer.create_text(text);
        api.writer.insert(position, &[node])?;
        Ok(())
    }
}

/// Shrinks a range so UI elements on its boundaries stay out of it.
fn trimmed(view: &ViewDocument, range: ViewRange) -> ViewRange {
    let ViewRange { mut start, mut end } = range;
    if start.parent == end.parent && !view[start.parent].is_text() {
        let children = view.children(start.parent);
        while start.offset < end.offset && children.get(start.offset).is_some_and(|n| view[*n].is_ui()) {
            start.offset += 1;
        }
        while end.offset > start.offset && children.get(end.offset - 1).is_some_and(|n| view[*n].is_ui()) {
            end.offset -= 1;
        }
    }
    ViewRange::new(start, end)
}

/// Removes the view of removed model content and unbinds it, deferred,
/// so the nodes can still be reused if the content comes back in this pass.
pub fn remove() -> impl Fn(&mut EventInfo, &RemoveData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    |_, data, api| {
        let start = api.to_view_position(&data.position)?;
        let end_position: Position = data.position.shifted_by(data.length as isize);
        let end = api.to_view_position(&end_position)?;
        let range = trimmed(api.writer.document(), ViewRange::new(start, end));
        let removed = api.writer.remove(range)?;
        for node in removed {
            for descendant in api.writer.document().descendants(node) {
                api.mapper.unbind_view_element(descendant, true, api.writer.document());
            }
        }
        Ok(())
    }
}

/// Registers text insertion, removal and the selection converters.
pub fn register_default_converters(dispatcher: &mut DowncastDispatcher) {
    dispatcher.on_insert("insert:$text", Priority::LOWEST, insert_text());
    dispatcher.on_remove("remove", Priority::LOW, remove());
    dispatcher.on_selection(Priority::HIGH, clear_attributes());
    dispatcher.on_selection(Priority::LOW, convert_range_selection());
    dispatcher.on_selection(Priority::LOW, convert_collapsed_selection());
}

/// Registers converters on one dispatcher from high level descriptions.
pub struct DowncastHelpers<'a> {
    dispatcher: &'a mut DowncastDispatcher,
    highlight_priority: u32,
}

impl<'a> DowncastHelpers<'a> {
    pub fn new(dispatcher: &'a mut DowncastDispatcher) -> Self {
        Self {
            dispatcher,
            highlight_priority: DEFAULT_PRIORITY,
        }
    }

    /// Priority given to highlights whose descriptor does not set one.
    pub fn with_highlight_priority(mut self, priority: u32) -> Self {
        self.highlight_priority = priority;
        self
    }

    pub fn dispatcher(&mut self) -> &mut DowncastDispatcher {
        self.dispatcher
    }
}
