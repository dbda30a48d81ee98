use std::rc::Rc;

use scribe_model::{ElementId, Item, Node, Range};
use scribe_view::{HighlightDescriptor, ViewNodeId, ViewRange};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{DowncastHelpers, ViewElementDefinition};
use crate::consumable::{ConsumableItem, ConsumableKey};
use crate::conversion_api::{ConversionApi, ConversionItem, MarkerData};
use crate::emitter::{EventInfo, Priority};
use crate::error::ConversionResult;

/// Creates the view element for the opening (`true`) or closing boundary.
pub type MarkerElementCreator = Rc<dyn Fn(&MarkerData, bool, &mut ConversionApi<'_>) -> Option<ViewNodeId>>;

pub type HighlightCreator = Rc<dyn Fn(&MarkerData, &ConversionApi<'_>) -> Option<HighlightDescriptor>>;

pub type MarkerDataCreator = Rc<dyn Fn(&str) -> Option<MarkerDataView>>;

#[derive(Clone)]
pub enum HighlightView {
    Descriptor(HighlightDescriptor),
    Creator(HighlightCreator),
}

impl From<HighlightDescriptor> for HighlightView {
    fn from(descriptor: HighlightDescriptor) -> Self {
        HighlightView::Descriptor(descriptor)
    }
}

/// Group and name a marker is written under in data attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerDataView {
    pub group: String,
    pub name: Option<String>,
}

impl MarkerDataView {
    /// `comment:1` is group `comment`, name `1`.
    pub fn from_marker_name(marker_name: &str) -> Self {
        match marker_name.split_once(':') {
            Some((group, name)) => Self {
                group: group.to_string(),
                name: Some(name.to_string()),
            },
            None => Self {
                group: marker_name.to_string(),
                name: None,
            },
        }
    }

    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

pub struct MarkerToElement {
    pub model: String,
    pub view: MarkerElementCreator,
    pub priority: Priority,
}

impl MarkerToElement {
    /// Both boundaries are rendered as UI elements built from `view`.
    pub fn new(model: &str, view: impl Into<ViewElementDefinition>) -> Self {
        let definition = view.into();
        Self::with_creator(model, move |_, _, api| Some(definition.create_ui(&mut api.writer)))
    }

    pub fn with_creator(
        model: &str,
        creator: impl Fn(&MarkerData, bool, &mut ConversionApi<'_>) -> Option<ViewNodeId> + 'static,
    ) -> Self {
        Self {
            model: model.to_string(),
            view: Rc::new(creator),
            priority: Priority::NORMAL,
        }
    }
}

pub struct MarkerToHighlight {
    pub model: String,
    pub view: HighlightView,
    pub priority: Priority,
}

impl MarkerToHighlight {
    pub fn new(model: &str, view: impl Into<HighlightView>) -> Self {
        Self {
            model: model.to_string(),
            view: view.into(),
            priority: Priority::NORMAL,
        }
    }
}

pub struct MarkerToData {
    pub model: String,
    pub view: MarkerDataCreator,
    pub priority: Priority,
}

impl MarkerToData {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            view: Rc::new(|name| Some(MarkerDataView::from_marker_name(name))),
            priority: Priority::NORMAL,
        }
    }
}

fn whole_range(data: &MarkerData) -> ConsumableItem {
    ConsumableItem::Range(data.marker_range.clone())
}

/// Renders marker boundaries as UI elements bound to the marker name.
pub fn insert_ui_element(
    creator: MarkerElementCreator,
) -> impl Fn(&mut EventInfo, &MarkerData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    move |info, data, api| {
        let (Some(start), Some(end)) = (creator(data, true, api), creator(data, false, api)) else {
            return Ok(());
        };
        let key = ConsumableKey::add_marker(data.marker_name.as_str());
        if !api.consumable.consume(whole_range(data), &key) {
            return Ok(());
        }
        let range = &data.marker_range;
        let position = api.to_view_position(&range.start)?;
        api.writer.insert(position, &[start])?;
        api.mapper.bind_element_to_marker(start, &data.marker_name);
        if !range.is_collapsed() {
            let position = api.to_view_position(&range.end)?;
            api.writer.insert(position, &[end])?;
            api.mapper.bind_element_to_marker(end, &data.marker_name);
        }
        info.stop();
        Ok(())
    }
}

pub fn remove_ui_element() -> impl Fn(&mut EventInfo, &MarkerData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    |info, data, api| {
        let Some(elements) = api.mapper.marker_name_to_elements(&data.marker_name) else {
            return Ok(());
        };
        for element in elements {
            api.mapper.unbind_element_from_marker_name(element, &data.marker_name);
            api.writer.remove_node(element)?;
        }
        info.stop();
        Ok(())
    }
}

fn data_attribute(group: &str, is_start: bool, is_before: bool) -> String {
    let boundary = if is_start { "start" } else { "end" };
    let side = if is_before { "before" } else { "after" };
    format!("data-{group}-{boundary}-{side}")
}

fn boundary_element(api: &ConversionApi<'_>, range: &Range, is_start: bool) -> Option<(ElementId, bool)> {
    let position = if is_start { &range.start } else { &range.end };
    let after = api.document.element_after(position).map(|element| element.id);
    let before = match api.document.node_before(position) {
        Some(Node::Element(element)) => Some(element.id),
        _ => None,
    };
    if (is_start && after.is_some()) || (!is_start && before.is_none()) {
        after.map(|id| (id, true))
    } else {
        before.map(|id| (id, false))
    }
}

/// Writes one marker boundary as a data attribute on a neighbouring
/// element or, failing that, as a `<group-start>` or `<group-end>` UI element.
fn insert_boundary(
    api: &mut ConversionApi<'_>,
    data: &MarkerData,
    view: &MarkerDataView,
    is_start: bool,
) -> ConversionResult<()> {
    let range = &data.marker_range;
    let target = boundary_element(api, range, is_start)
        .and_then(|(id, is_before)| Some((api.mapper.to_view_element(id)?, is_before)));

    if let Some((element, is_before)) = target {
        let attribute = data_attribute(&view.group, is_start, is_before);
        let mut names: Vec<String> = api.writer.document()[element]
            .attribute(&attribute)
            .map(|value| value.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        names.insert(0, view.name().to_string());
        api.writer.set_attribute(&attribute, &names.join(","), element);
        api.mapper.bind_element_to_marker(element, &data.marker_name);
        return Ok(());
    }

    let position = api.to_view_position(if is_start { &range.start } else { &range.end })?;
    let name = format!("{}-{}", view.group, if is_start { "start" } else { "end" });
    let attributes: Vec<(&str, &str)> = view.name.as_deref().map(|name| ("name", name)).into_iter().collect();
    let element = api.writer.create_ui_element(&name, &attributes);
    api.writer.insert(position, &[element])?;
    api.mapper.bind_element_to_marker(element, &data.marker_name);
    Ok(())
}

/// Writes a marker into the view so it can be restored from data.
pub fn insert_marker_data(
    creator: MarkerDataCreator,
) -> impl Fn(&mut EventInfo, &MarkerData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    move |info, data, api| {
        let Some(view) = creator(&data.marker_name) else {
            return Ok(());
        };
        let key = ConsumableKey::add_marker(data.marker_name.as_str());
        if !api.consumable.consume(whole_range(data), &key) {
            return Ok(());
        }
        // End first, so a collapsed marker reads start then end.
        insert_boundary(api, data, &view, false)?;
        insert_boundary(api, data, &view, true)?;
        info.stop();
        Ok(())
    }
}

fn strip_marker_name(api: &mut ConversionApi<'_>, element: ViewNodeId, attribute: &str, name: &str) {
    let Some(value) = api.writer.document()[element].attribute(attribute).map(str::to_string) else {
        return;
    };
    let mut remaining: Vec<&str> = value.split(',').filter(|candidate| *candidate != name).collect();
    remaining.dedup();
    if remaining.is_empty() {
        api.writer.remove_attribute(attribute, element);
    } else {
        api.writer.set_attribute(attribute, &remaining.join(","), element);
    }
}

pub fn remove_marker_data(
    creator: MarkerDataCreator,
) -> impl Fn(&mut EventInfo, &MarkerData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    move |info, data, api| {
        let Some(view) = creator(&data.marker_name) else {
            return Ok(());
        };
        let Some(elements) = api.mapper.marker_name_to_elements(&data.marker_name) else {
            return Ok(());
        };
        for element in elements {
            api.mapper.unbind_element_from_marker_name(element, &data.marker_name);
            if api.writer.document()[element].is_ui() {
                api.writer.remove_node(element)?;
                continue;
            }
            for (is_start, is_before) in [(true, true), (true, false), (false, true), (false, false)] {
                let attribute = data_attribute(&view.group, is_start, is_before);
                strip_marker_name(api, element, &attribute, view.name());
            }
        }
        info.stop();
        Ok(())
    }
}

fn prepare_descriptor(
    view: &HighlightView,
    data: &MarkerData,
    api: &ConversionApi<'_>,
    default_priority: u32,
) -> Option<HighlightDescriptor> {
    let mut descriptor = match view {
        HighlightView::Descriptor(descriptor) => descriptor.clone(),
        HighlightView::Creator(creator) => creator(data, api)?,
    };
    descriptor.priority.get_or_insert(default_priority);
    descriptor.id.get_or_insert_with(|| data.marker_name.clone());
    Some(descriptor)
}

fn create_highlight_element(api: &mut ConversionApi<'_>, descriptor: &HighlightDescriptor) -> ViewNodeId {
    let attributes: Vec<(&str, &str)> = descriptor
        .attributes
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    let element = api.writer.create_attribute_element(
        "span",
        &attributes,
        descriptor.priority.unwrap_or_default(),
        descriptor.id.as_deref(),
    );
    let classes: Vec<&str> = descriptor.classes.iter().map(String::as_str).collect();
    if !classes.is_empty() {
        api.writer.add_class(&classes, element);
    }
    element
}

/// Highlight spans with `id` around or inside the wrapped range.
fn highlight_spans(api: &ConversionApi<'_>, range: ViewRange, id: &str) -> Vec<ViewNodeId> {
    let view = api.writer.document();
    let parent = range.start.parent;
    let inside: Vec<ViewNodeId> = if view[parent].is_text() {
        Vec::new()
    } else {
        let end = range.end.offset.min(view.children(parent).len());
        view.children(parent)[range.start.offset.min(end)..end]
            .iter()
            .flat_map(|child| view.descendants(*child))
            .collect()
    };
    std::iter::once(parent)
        .chain(view.ancestors(parent))
        .chain(inside)
        .filter(|node| view[*node].is_attribute() && view[*node].element_id() == Some(id))
        .collect()
}

/// Wraps highlighted text, or the view selection, in a highlight span.
pub fn highlight_text(
    view: HighlightView,
    default_priority: u32,
) -> impl Fn(&mut EventInfo, &MarkerData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    move |_, data, api| {
        if !matches!(&data.item, ConversionItem::Selection | ConversionItem::Item(Item::Text { .. })) {
            return Ok(());
        }
        let Some(descriptor) = prepare_descriptor(&view, data, api, default_priority) else {
            return Ok(());
        };
        let key = ConsumableKey::add_marker(data.marker_name.as_str());
        if !api.consumable.consume(&data.item, &key) {
            return Ok(());
        }
        let element = create_highlight_element(api, &descriptor);

        if data.item.is_selection() {
            if let Some(range) = api.writer.document().selection().ranges.first().copied() {
                api.writer.wrap(range, element)?;
            }
            return Ok(());
        }
        let range = api.to_view_range(&data.range)?;
        let wrapped = api.writer.wrap(range, element)?;
        let id = descriptor.id.unwrap_or_default();
        if let Some(span) = highlight_spans(api, wrapped, &id).into_iter().next() {
            api.mapper.bind_element_to_marker(span, &data.marker_name);
        }
        Ok(())
    }
}

/// Hands a highlighted element to its own highlight handler, if it has one.
/// The element's content is consumed with it.
pub fn highlight_element(
    view: HighlightView,
    default_priority: u32,
) -> impl Fn(&mut EventInfo, &MarkerData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    move |_, data, api| {
        let ConversionItem::Item(Item::Element { id, .. }) = &data.item else {
            return Ok(());
        };
        let Some(descriptor) = prepare_descriptor(&view, data, api, default_priority) else {
            return Ok(());
        };
        let key = ConsumableKey::add_marker(data.marker_name.as_str());
        if !api.consumable.can_consume(&data.item, &key) {
            return Ok(());
        }
        let Some(element) = api.mapper.to_view_element(*id) else {
            return Ok(());
        };
        let Some(handler) = api.writer.document().highlight_handler(element).cloned() else {
            return Ok(());
        };

        api.consumable.consume(&data.item, &key);
        if let Some(inside) = api.document.range_in(*id) {
            for item in api.document.items(&inside, false) {
                api.consumable.consume(&item, &key);
            }
        }
        (handler.add)(&mut api.writer, element, &descriptor);
        api.mapper.bind_element_to_marker(element, &data.marker_name);
        Ok(())
    }
}

/// Removes highlight spans of a marker, including the pieces the span was
/// split into, and asks handled elements to drop the highlight.
pub fn remove_highlight(
    view: HighlightView,
    default_priority: u32,
) -> impl Fn(&mut EventInfo, &MarkerData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    move |info, data, api| {
        if data.marker_range.is_collapsed() {
            return Ok(());
        }
        let Some(descriptor) = prepare_descriptor(&view, data, api, default_priority) else {
            return Ok(());
        };
        let id = descriptor.id.unwrap_or_default();
        let bound = api.mapper.marker_name_to_elements(&data.marker_name).unwrap_or_default();
        for element in &bound {
            api.mapper.unbind_element_from_marker_name(*element, &data.marker_name);
            if api.writer.document()[*element].is_attribute() {
                continue;
            }
            if let Some(handler) = api.writer.document().highlight_handler(*element).cloned() {
                (handler.remove)(&mut api.writer, *element, &id);
            }
        }

        let document = api.writer.document();
        let roots: Vec<ViewNodeId> = document
            .root_names()
            .filter_map(|name| document.root(name).ok())
            .collect();
        let spans: Vec<ViewNodeId> = roots
            .into_iter()
            .flat_map(|root| document.descendants(root))
            .filter(|node| document[*node].is_attribute() && document[*node].element_id() == Some(id.as_str()))
            .collect();
        trace!(marker = data.marker_name.as_str(), spans = spans.len(), "Removing highlight");
        for span in spans {
            if api.writer.document().is_attached(span) {
                api.writer.unwrap_element(span)?;
            }
        }
        info.stop();
        Ok(())
    }
}

impl DowncastHelpers<'_> {
    pub fn marker_to_element(&mut self, config: MarkerToElement) -> &mut Self {
        let MarkerToElement { model, view, priority } = config;
        self.dispatcher
            .on_add_marker(format!("addMarker:{model}"), priority, insert_ui_element(view));
        self.dispatcher
            .on_remove_marker(format!("removeMarker:{model}"), priority, remove_ui_element());
        self
    }

    pub fn marker_to_highlight(&mut self, config: MarkerToHighlight) -> &mut Self {
        let MarkerToHighlight { model, view, priority } = config;
        let default_priority = self.highlight_priority;
        let added = format!("addMarker:{model}");
        self.dispatcher
            .on_add_marker(added.clone(), priority, highlight_text(view.clone(), default_priority));
        self.dispatcher
            .on_add_marker(added, priority, highlight_element(view.clone(), default_priority));
        self.dispatcher.on_remove_marker(
            format!("removeMarker:{model}"),
            priority,
            remove_highlight(view, default_priority),
        );
        self
    }

    pub fn marker_to_data(&mut self, config: MarkerToData) -> &mut Self {
        let MarkerToData { model, view, priority } = config;
        self.dispatcher
            .on_add_marker(format!("addMarker:{model}"), priority, insert_marker_data(view.clone()));
        self.dispatcher
            .on_remove_marker(format!("removeMarker:{model}"), priority, remove_marker_data(view));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_names_split_into_group_and_name() {
        assert_eq!(
            MarkerDataView::from_marker_name("comment:thread:1"),
            MarkerDataView {
                group: "comment".to_string(),
                name: Some("thread:1".to_string()),
            }
        );
        assert_eq!(MarkerDataView::from_marker_name("search").name, None);
    }

    #[test]
    fn test_data_attribute_names() {
        assert_eq!(data_attribute("comment", true, true), "data-comment-start-before");
        assert_eq!(data_attribute("comment", false, false), "data-comment-end-after");
    }
}
