//! # Downcast Dispatcher
//!
//! Turns the differ's change list into named events:
//!
//! - `insert:<name>` and `remove:<name>`
//! - `attribute:<key>:<name>`
//! - `addMarker:<name>` and `removeMarker:<name>`
//! - `selection`
//!
//! Converters listen to these events and write to the view. The dispatcher
//! only decides what fires and in which order. Whether anything is rendered
//! is up to the listeners.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use scribe_model::{ChangeEntry, Document, ElementId, Item, Position, Range, Schema};
use scribe_view::{DowncastWriter, ViewDocument, ViewNodeId};
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::consumable::{ConsumableItem, ConsumableKey, Consumables};
use crate::conversion_api::{
    AttributeData, ConversionApi, ConversionItem, EventData, InsertData, MarkerData, RemoveData,
    SelectionData,
};
use crate::emitter::{Emitter, EventInfo, Priority};
use crate::error::ConversionResult;
use crate::mapper::Mapper;

pub type Listener = Rc<dyn Fn(&mut EventInfo, &EventData, &mut ConversionApi<'_>) -> ConversionResult<()>>;

/// Decides whether an existing view element may be moved into a rebuilt parent.
pub type CanReuseView = Rc<dyn Fn(&ViewDocument, ViewNodeId, &Item) -> bool>;

static NO_OPTIONS: Value = Value::Null;

/// Everything a conversion call reads or writes.
pub struct DowncastContext<'a> {
    pub document: &'a Document,
    pub schema: &'a Schema,
    pub mapper: &'a mut Mapper,
    pub view: &'a mut ViewDocument,
    pub options: &'a Value,
}

impl<'a> DowncastContext<'a> {
    pub fn new(
        document: &'a Document,
        schema: &'a Schema,
        mapper: &'a mut Mapper,
        view: &'a mut ViewDocument,
    ) -> Self {
        Self {
            document,
            schema,
            mapper,
            view,
            options: &NO_OPTIONS,
        }
    }
}

#[derive(Default)]
pub struct DowncastDispatcher {
    emitter: Emitter<Listener>,
    /// Event name to the name of the element rebuilt when it fires.
    reconversion_triggers: HashMap<String, String>,
    can_reuse_view: Option<CanReuseView>,
}

impl std::fmt::Debug for DowncastDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DowncastDispatcher")
            .field("emitter", &self.emitter)
            .field("reconversion_triggers", &self.reconversion_triggers)
            .finish()
    }
}

/// Whether rebuilding the element before `element_position` already renders
/// `change`. The rebuild converts direct children again, except that element
/// children keep their view, so attribute changes on them still apply.
/// Changes deeper down land in those kept views and are never covered.
fn is_covered_by_rebuild(document: &Document, change: &ChangeEntry, element_position: &Position) -> bool {
    let position = change.position();
    let is_child = position.root == element_position.root
        && position.path.len() == element_position.path.len() + 1
        && position.path.starts_with(&element_position.path);
    match change {
        _ if !is_child => false,
        ChangeEntry::Attribute { range, .. } => document.element_after(&range.start).is_none(),
        _ => true,
    }
}

impl DowncastDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, event: impl Into<String>, priority: Priority, listener: Listener) {
        self.emitter.on(event, priority, listener);
    }

    pub fn on_insert(
        &mut self,
        event: impl Into<String>,
        priority: Priority,
        listener: impl Fn(&mut EventInfo, &InsertData, &mut ConversionApi<'_>) -> ConversionResult<()> + 'static,
    ) {
        self.on(
            event,
            priority,
            Rc::new(move |info, data, api| match data {
                EventData::Insert(data) => listener(info, data, api),
                _ => Ok(()),
            }),
        );
    }

    pub fn on_remove(
        &mut self,
        event: impl Into<String>,
        priority: Priority,
        listener: impl Fn(&mut EventInfo, &RemoveData, &mut ConversionApi<'_>) -> ConversionResult<()> + 'static,
    ) {
        self.on(
            event,
            priority,
            Rc::new(move |info, data, api| match data {
                EventData::Remove(data) => listener(info, data, api),
                _ => Ok(()),
            }),
        );
    }

    pub fn on_attribute(
        &mut self,
        event: impl Into<String>,
        priority: Priority,
        listener: impl Fn(&mut EventInfo, &AttributeData, &mut ConversionApi<'_>) -> ConversionResult<()> + 'static,
    ) {
        self.on(
            event,
            priority,
            Rc::new(move |info, data, api| match data {
                EventData::Attribute(data) => listener(info, data, api),
                _ => Ok(()),
            }),
        );
    }

    pub fn on_add_marker(
        &mut self,
        event: impl Into<String>,
        priority: Priority,
        listener: impl Fn(&mut EventInfo, &MarkerData, &mut ConversionApi<'_>) -> ConversionResult<()> + 'static,
    ) {
        self.on(
            event,
            priority,
            Rc::new(move |info, data, api| match data {
                EventData::AddMarker(data) => listener(info, data, api),
                _ => Ok(()),
            }),
        );
    }

    pub fn on_remove_marker(
        &mut self,
        event: impl Into<String>,
        priority: Priority,
        listener: impl Fn(&mut EventInfo, &MarkerData, &mut ConversionApi<'_>) -> ConversionResult<()> + 'static,
    ) {
        self.on(
            event,
            priority,
            Rc::new(move |info, data, api| match data {
                EventData::RemoveMarker(data) => listener(info, data, api),
                _ => Ok(()),
            }),
        );
    }

    pub fn on_selection(
        &mut self,
        priority: Priority,
        listener: impl Fn(&mut EventInfo, &SelectionData, &mut ConversionApi<'_>) -> ConversionResult<()> + 'static,
    ) {
        self.on(
            "selection",
            priority,
            Rc::new(move |info, data, api| match data {
                EventData::Selection(data) => listener(info, data, api),
                _ => Ok(()),
            }),
        );
    }

    /// Makes `event` rebuild the whole `element_name` element it concerns.
    /// Event names are `attribute:<key>:<element>` or `children:<element>`.
    pub fn map_reconversion_trigger(&mut self, element_name: &str, event_name: &str) {
        self.reconversion_triggers
            .insert(event_name.to_string(), element_name.to_string());
    }

    pub fn set_can_reuse_view(&mut self, predicate: impl Fn(&ViewDocument, ViewNodeId, &Item) -> bool + 'static) {
        self.can_reuse_view = Some(Rc::new(predicate));
    }

    pub fn can_reuse_view(&self, view: &ViewDocument, node: ViewNodeId, item: &Item) -> bool {
        self.can_reuse_view
            .as_ref()
            .map_or(true, |predicate| predicate(view, node, item))
    }

    fn create_api<'b>(&'b self, cx: &'b mut DowncastContext<'_>) -> ConversionApi<'b> {
        ConversionApi {
            dispatcher: self,
            document: cx.document,
            schema: cx.schema,
            mapper: &mut *cx.mapper,
            writer: DowncastWriter::new(&mut *cx.view),
            consumable: Consumables::new(),
            options: cx.options,
            slot_placements: HashMap::new(),
        }
    }

    /// Calls every listener of `name` until one stops the event.
    pub fn fire(&self, name: &str, data: &EventData, api: &mut ConversionApi<'_>) -> ConversionResult<()> {
        let listeners = self.emitter.listeners_for(name);
        if listeners.is_empty() {
            return Ok(());
        }
        trace!(event = name, listeners = listeners.len(), "Firing conversion event");
        let mut info = EventInfo::new(name);
        for listener in listeners {
            listener(&mut info, data, api)?;
            if info.is_stopped() {
                break;
            }
        }
        Ok(())
    }

    fn test_and_fire(
        &self,
        api: &mut ConversionApi<'_>,
        item: ConsumableItem,
        key: &ConsumableKey,
        name: &str,
        data: EventData,
    ) -> ConversionResult<()> {
        if !api.consumable.can_consume(item, key) {
            return Ok(());
        }
        self.fire(name, &data, api)
    }

    /// Full synchronization of the view with the document's buffered changes.
    #[instrument(skip_all)]
    pub fn convert_changes(&self, cx: &mut DowncastContext<'_>) -> ConversionResult<()> {
        let document = cx.document;
        let differ = document.differ();

        for (name, range) in differ.markers_to_remove() {
            self.convert_marker_remove(&name, &range, cx)?;
        }

        let changes = self.reduce_changes(document, document.changes());
        debug!(changes = changes.len(), "Converting changes");
        for change in changes {
            match change {
                ChangeEntry::Insert { position, length, .. } => {
                    self.convert_insert(&Range::from_offset(position, length), cx)?;
                }
                ChangeEntry::Remove { position, length, name } => {
                    self.convert_remove(&position, length, &name, cx)?;
                }
                ChangeEntry::Reconvert { element, .. } => {
                    self.reconvert_element(element, cx)?;
                }
                ChangeEntry::Attribute {
                    range,
                    attribute_key,
                    attribute_old_value,
                    attribute_new_value,
                } => {
                    self.convert_attribute(&range, &attribute_key, attribute_old_value, attribute_new_value, cx)?;
                }
            }
        }

        cx.mapper.flush_deferred_bindings(cx.view);
        for name in cx.mapper.flush_unbound_marker_names() {
            if let Some(marker) = document.markers().get(&name) {
                let range = marker.range.clone();
                self.convert_marker_remove(&name, &range, cx)?;
                self.convert_marker_add(&name, &range, cx)?;
            }
        }

        for (name, range) in differ.markers_to_add() {
            self.convert_marker_add(&name, &range, cx)?;
        }
        Ok(())
    }

    fn reconversion_target(&self, document: &Document, change: &ChangeEntry) -> Option<(ElementId, String)> {
        let (event, element) = match change {
            ChangeEntry::Attribute { range, attribute_key, .. } => {
                let element = document.element_after(&range.start)?;
                (format!("attribute:{attribute_key}:{}", element.name), element)
            }
            ChangeEntry::Insert { position, .. } | ChangeEntry::Remove { position, .. } => {
                let parent = document.parent_of(position).ok()?;
                (format!("children:{}", parent.name), parent)
            }
            ChangeEntry::Reconvert { .. } => return None,
        };
        let target = self.reconversion_triggers.get(&event)?;
        (*target == element.name).then(|| (element.id, element.name.clone()))
    }

    /// Replaces changes hitting a reconversion trigger with one `Reconvert`
    /// entry per element, placed before the changes inside it. Of those, only
    /// the ones the rebuild renders again are dropped.
    pub fn reduce_changes(&self, document: &Document, changes: Vec<ChangeEntry>) -> Vec<ChangeEntry> {
        if self.reconversion_triggers.is_empty() {
            return changes;
        }
        let mut reconverted: HashSet<ElementId> = HashSet::new();
        let mut rebuilt_at: Vec<Position> = Vec::new();
        let mut reduced: Vec<ChangeEntry> = Vec::new();

        for change in changes {
            let target = self
                .reconversion_target(document, &change)
                .and_then(|(id, name)| Some((id, name, document.position_before(id)?)));
            let Some((element, name, position)) = target else {
                reduced.push(change);
                continue;
            };
            if !reconverted.insert(element) {
                continue;
            }
            let mut index = reduced.len();
            for (i, earlier) in reduced.iter().enumerate().rev() {
                let at = earlier.position();
                let is_remove_here = matches!(earlier, ChangeEntry::Remove { .. }) && *at == position;
                if at.is_before(&position) || is_remove_here {
                    break;
                }
                index = i;
            }
            debug!(%element, name = name.as_str(), "Reconverting element");
            reduced.insert(index, ChangeEntry::Reconvert { element, position: position.clone(), name });
            rebuilt_at.push(position);
        }

        reduced.retain(|change| {
            matches!(change, ChangeEntry::Reconvert { .. })
                || !rebuilt_at
                    .iter()
                    .any(|position| is_covered_by_rebuild(document, change, position))
        });
        reduced
    }

    fn add_insert_consumables(consumable: &mut Consumables, items: &[Item]) {
        for item in items {
            consumable.add(item, ConsumableKey::Insert);
            for key in item.attributes().keys() {
                consumable.add(item, ConsumableKey::attribute(key.as_str()));
            }
        }
    }

    /// Converts the content of a flat range in document order.
    #[instrument(skip(self, cx), fields(range = ?range))]
    pub fn convert_insert(&self, range: &Range, cx: &mut DowncastContext<'_>) -> ConversionResult<()> {
        let mut api = self.create_api(cx);
        self.convert_insert_with(&mut api, range, false)
    }

    pub(crate) fn convert_insert_with(
        &self,
        api: &mut ConversionApi<'_>,
        range: &Range,
        reconversion: bool,
    ) -> ConversionResult<()> {
        let items = api.document.items(range, false);
        Self::add_insert_consumables(&mut api.consumable, &items);
        for item in items {
            let event = format!("insert:{}", item.name());
            let data = InsertData {
                range: item.range(),
                item: item.clone(),
                reconversion,
            };
            self.test_and_fire(api, (&item).into(), &ConsumableKey::Insert, &event, EventData::Insert(data))?;
            self.convert_attributes_of(api, &item)?;
        }
        Ok(())
    }

    pub(crate) fn convert_attributes_of(&self, api: &mut ConversionApi<'_>, item: &Item) -> ConversionResult<()> {
        for (key, value) in item.attributes() {
            let event = format!("attribute:{key}:{}", item.name());
            let data = AttributeData {
                item: ConversionItem::Item(item.clone()),
                range: item.range(),
                attribute_key: key.clone(),
                attribute_old_value: None,
                attribute_new_value: Some(value.clone()),
            };
            self.test_and_fire(
                api,
                item.into(),
                &ConsumableKey::attribute(key.as_str()),
                &event,
                EventData::Attribute(data),
            )?;
        }
        Ok(())
    }

    pub fn convert_remove(
        &self,
        position: &Position,
        length: usize,
        name: &str,
        cx: &mut DowncastContext<'_>,
    ) -> ConversionResult<()> {
        let mut api = self.create_api(cx);
        let data = EventData::Remove(RemoveData {
            position: position.clone(),
            length,
            name: name.to_string(),
        });
        self.fire(&format!("remove:{name}"), &data, &mut api)
    }

    pub fn convert_attribute(
        &self,
        range: &Range,
        key: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
        cx: &mut DowncastContext<'_>,
    ) -> ConversionResult<()> {
        let mut api = self.create_api(cx);
        let items = api.document.items(range, range.is_flat());
        let consumable_key = ConsumableKey::attribute(key);
        for item in &items {
            api.consumable.add(item, consumable_key.clone());
        }
        for item in items {
            let event = format!("attribute:{key}:{}", item.name());
            let data = AttributeData {
                range: item.range(),
                item: ConversionItem::Item(item.clone()),
                attribute_key: key.to_string(),
                attribute_old_value: old_value.clone(),
                attribute_new_value: new_value.clone(),
            };
            self.test_and_fire(&mut api, (&item).into(), &consumable_key, &event, EventData::Attribute(data))?;
        }
        Ok(())
    }

    /// Rebuilds the view of one element. Children that already have a view
    /// are moved into the new element instead of being converted again.
    #[instrument(skip(self, cx))]
    pub fn reconvert_element(&self, element: ElementId, cx: &mut DowncastContext<'_>) -> ConversionResult<()> {
        let document = cx.document;
        let (Some(range), Some(inner)) = (document.range_on(element), document.range_in(element)) else {
            return Ok(());
        };
        let Some(item) = document.items(&range, true).into_iter().next() else {
            return Ok(());
        };

        let mut api = self.create_api(cx);
        Self::add_insert_consumables(&mut api.consumable, std::slice::from_ref(&item));

        let old_view = api.mapper.to_view_element(element);
        if let Some(old_range) = old_view.and_then(|old| api.writer.document().range_on(old)) {
            api.writer.remove(old_range)?;
        }

        let event = format!("insert:{}", item.name());
        let data = InsertData {
            item: item.clone(),
            range: range.clone(),
            reconversion: true,
        };
        self.test_and_fire(&mut api, (&item).into(), &ConsumableKey::Insert, &event, EventData::Insert(data))?;
        self.convert_attributes_of(&mut api, &item)?;

        let new_view = api.mapper.to_view_element(element);
        if let Some(new_view) = new_view.filter(|new_view| Some(*new_view) != old_view) {
            let new_root = api.writer.document().top_most(new_view);
            for child in document.items(&inner, true) {
                let existing = child.element_id().and_then(|id| api.mapper.to_view_element(id));
                match existing {
                    Some(view) if api.writer.document().top_most(view) == new_root => {}
                    Some(view) if api.can_reuse_view(view, &child) => {
                        let target = api.to_view_position(child.start())?;
                        if let Some(source) = api.writer.document().range_on(view) {
                            api.writer.move_range(source, target)?;
                            debug!(%view, "Reused view element");
                        }
                    }
                    _ if api.consumable.test(&child, &ConsumableKey::Insert) == Some(false) => {}
                    _ => api.convert_item(&child)?,
                }
            }
        }

        if let Some(old) = old_view.filter(|old| Some(*old) != new_view) {
            api.mapper.unbind_view_element(old, false, api.writer.document());
        }
        Ok(())
    }

    /// Whether a marker should be converted for a caret at `position`. It
    /// should not when an element inside the marker, containing the caret,
    /// renders highlights itself.
    fn should_marker_change_be_converted(api: &ConversionApi<'_>, position: &Position, marker_range: &Range) -> bool {
        let view = api.writer.document();
        !position.ancestor_positions().iter().any(|before| {
            let contains = !before.is_before(&marker_range.start) && before.is_before(&marker_range.end);
            contains
                && api
                    .document
                    .element_after(before)
                    .and_then(|element| api.mapper.to_view_element(element.id))
                    .is_some_and(|node| view.highlight_handler(node).is_some())
        })
    }

    /// Fires `selection`, then, for a caret, the markers and attributes it
    /// carries.
    #[instrument(skip_all)]
    pub fn convert_selection(&self, cx: &mut DowncastContext<'_>) -> ConversionResult<()> {
        let document = cx.document;
        let selection = document.selection();
        let mut api = self.create_api(cx);

        api.consumable.add(ConsumableItem::Selection, ConsumableKey::Selection);
        let data = EventData::Selection(SelectionData {
            ranges: selection.ranges().to_vec(),
            backward: selection.is_backward(),
        });
        self.test_and_fire(&mut api, ConsumableItem::Selection, &ConsumableKey::Selection, "selection", data)?;

        if !selection.is_collapsed() {
            return Ok(());
        }
        let Some(range) = selection.first_range().cloned() else {
            return Ok(());
        };
        let position = range.start.clone();

        let markers: Vec<(String, Range)> = document
            .markers()
            .markers_at_position(&position)
            .filter(|marker| Self::should_marker_change_be_converted(&api, &position, &marker.range))
            .map(|marker| (marker.name.clone(), marker.range.clone()))
            .collect();
        let attributes = document.selection_attributes();

        for (name, _) in &markers {
            api.consumable
                .add(ConsumableItem::Selection, ConsumableKey::add_marker(name.as_str()));
        }
        for key in attributes.keys() {
            api.consumable
                .add(ConsumableItem::Selection, ConsumableKey::attribute(key.as_str()));
        }

        for (name, marker_range) in markers {
            let data = EventData::AddMarker(MarkerData {
                marker_name: name.clone(),
                marker_range,
                item: ConversionItem::Selection,
                range: range.clone(),
            });
            self.test_and_fire(
                &mut api,
                ConsumableItem::Selection,
                &ConsumableKey::add_marker(name.as_str()),
                &format!("addMarker:{name}"),
                data,
            )?;
        }

        for (key, value) in attributes {
            let data = EventData::Attribute(AttributeData {
                item: ConversionItem::Selection,
                range: range.clone(),
                attribute_key: key.clone(),
                attribute_old_value: None,
                attribute_new_value: Some(value),
            });
            self.test_and_fire(
                &mut api,
                ConsumableItem::Selection,
                &ConsumableKey::attribute(key.as_str()),
                &format!("attribute:{key}:$text"),
                data,
            )?;
        }
        Ok(())
    }

    /// Fires `addMarker:<name>` for the whole range, then for each item the
    /// whole-range listeners left unconsumed.
    pub fn convert_marker_add(&self, name: &str, range: &Range, cx: &mut DowncastContext<'_>) -> ConversionResult<()> {
        if range.is_in_graveyard() {
            return Ok(());
        }
        let event = format!("addMarker:{name}");
        let key = ConsumableKey::add_marker(name);
        let mut api = self.create_api(cx);

        let whole = ConsumableItem::Range(range.clone());
        api.consumable.add(whole.clone(), key.clone());
        let data = EventData::AddMarker(MarkerData {
            marker_name: name.to_string(),
            marker_range: range.clone(),
            item: ConversionItem::Range(range.clone()),
            range: range.clone(),
        });
        self.fire(&event, &data, &mut api)?;
        if !api.consumable.can_consume(whole, &key) {
            return Ok(());
        }

        let items = api.document.items(range, false);
        for item in &items {
            api.consumable.add(item, key.clone());
        }
        for item in items {
            let data = EventData::AddMarker(MarkerData {
                marker_name: name.to_string(),
                marker_range: range.clone(),
                range: item.range(),
                item: ConversionItem::Item(item.clone()),
            });
            self.test_and_fire(&mut api, (&item).into(), &key, &event, data)?;
        }
        Ok(())
    }

    pub fn convert_marker_remove(&self, name: &str, range: &Range, cx: &mut DowncastContext<'_>) -> ConversionResult<()> {
        if range.is_in_graveyard() {
            return Ok(());
        }
        let mut api = self.create_api(cx);
        let data = EventData::RemoveMarker(MarkerData {
            marker_name: name.to_string(),
            marker_range: range.clone(),
            item: ConversionItem::Range(range.clone()),
            range: range.clone(),
        });
        self.fire(&format!("removeMarker:{name}"), &data, &mut api)
    }
}
