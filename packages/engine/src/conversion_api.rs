//! Data handed to conversion listeners.
//!
//! A [`ConversionApi`] is built fresh for every top-level `convert_*` call and
//! dropped when that call returns, so its consumables never leak between
//! calls.

use std::collections::HashMap;

use scribe_model::{Document, ElementId, Item, Position, Range, Schema};
use scribe_view::{DowncastWriter, ViewNodeId, ViewPosition, ViewRange};
use serde_json::Value;

use crate::consumable::Consumables;
use crate::dispatcher::DowncastDispatcher;
use crate::error::ConversionResult;
use crate::mapper::Mapper;

/// What an event is about.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionItem {
    Item(Item),
    /// A whole marker range, converted in one go.
    Range(Range),
    Selection,
}

impl ConversionItem {
    pub fn as_item(&self) -> Option<&Item> {
        match self {
            ConversionItem::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn is_selection(&self) -> bool {
        matches!(self, ConversionItem::Selection)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertData {
    pub item: Item,
    pub range: Range,
    /// Set when the element is rebuilt and its old children may be reused.
    pub reconversion: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveData {
    pub position: Position,
    pub length: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeData {
    pub item: ConversionItem,
    pub range: Range,
    pub attribute_key: String,
    pub attribute_old_value: Option<Value>,
    pub attribute_new_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerData {
    pub marker_name: String,
    pub marker_range: Range,
    pub item: ConversionItem,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionData {
    pub ranges: Vec<Range>,
    pub backward: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Insert(InsertData),
    Remove(RemoveData),
    Attribute(AttributeData),
    AddMarker(MarkerData),
    RemoveMarker(MarkerData),
    Selection(SelectionData),
}

pub struct ConversionApi<'a> {
    pub dispatcher: &'a DowncastDispatcher,
    pub document: &'a Document,
    pub schema: &'a Schema,
    pub mapper: &'a mut Mapper,
    pub writer: DowncastWriter<'a>,
    pub consumable: Consumables,
    pub options: &'a Value,
    /// Model child positions redirected to a slot while a structure is filled.
    pub(crate) slot_placements: HashMap<Position, ViewNodeId>,
}

impl<'a> ConversionApi<'a> {
    pub fn to_view_position(&self, position: &Position) -> ConversionResult<ViewPosition> {
        let view = self.writer.document();
        if let Some(before) = self
            .slot_placements
            .get(position)
            .and_then(|slot| view.position_before(*slot))
        {
            return Ok(before);
        }
        self.mapper.to_view_position(self.document, view, position)
    }

    pub fn to_view_range(&self, range: &Range) -> ConversionResult<ViewRange> {
        Ok(ViewRange::new(
            self.to_view_position(&range.start)?,
            self.to_view_position(&range.end)?,
        ))
    }

    pub fn to_view_element(&self, element: ElementId) -> Option<ViewNodeId> {
        self.mapper.to_view_element(element)
    }

    /// Converts an item and everything inside it.
    pub fn convert_item(&mut self, item: &Item) -> ConversionResult<()> {
        let dispatcher = self.dispatcher;
        dispatcher.convert_insert_with(self, &item.range(), false)
    }

    pub fn convert_children(&mut self, element: ElementId) -> ConversionResult<()> {
        let Some(range) = self.document.range_in(element) else {
            return Ok(());
        };
        let dispatcher = self.dispatcher;
        dispatcher.convert_insert_with(self, &range, false)
    }

    /// Fires attribute events for every attribute the item has.
    pub fn convert_attributes(&mut self, item: &Item) -> ConversionResult<()> {
        let dispatcher = self.dispatcher;
        dispatcher.convert_attributes_of(self, item)
    }

    /// Renamed or otherwise refreshed elements never keep their old view.
    pub fn can_reuse_view(&self, view: ViewNodeId, item: &Item) -> bool {
        let refreshed = self
            .mapper
            .to_model_element(view)
            .is_some_and(|model| self.document.differ().is_refreshed(model));
        !refreshed && self.dispatcher.can_reuse_view(self.writer.document(), view, item)
    }
}
