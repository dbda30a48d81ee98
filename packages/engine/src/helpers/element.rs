use std::rc::Rc;

use scribe_model::Item;
use scribe_view::{DowncastWriter, ViewNodeId};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{DowncastHelpers, ViewElementDefinition};
use crate::consumable::ConsumableKey;
use crate::conversion_api::{ConversionApi, InsertData};
use crate::emitter::{EventInfo, Priority};
use crate::error::{ConversionError, ConversionResult};

pub type ElementCreator = Rc<dyn Fn(&Item, &mut ConversionApi<'_>) -> Option<ViewNodeId>>;

pub type StructureCreator = Rc<dyn Fn(&Item, &mut ConversionApi<'_>) -> ConversionResult<Option<Structure>>>;

/// Which model element a converter handles, and what rebuilds it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// Attributes whose change rebuilds the element.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Whether inserting or removing children rebuilds the element.
    #[serde(default)]
    pub children: bool,
}

impl From<&str> for ModelConfig {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl ModelConfig {
    pub fn with_attribute(mut self, key: &str) -> Self {
        self.attributes.push(key.to_string());
        self
    }

    pub fn with_children(mut self) -> Self {
        self.children = true;
        self
    }

    fn consumable_keys(&self, item: &Item) -> Vec<ConsumableKey> {
        let mut keys = vec![ConsumableKey::Insert];
        keys.extend(
            self.attributes
                .iter()
                .filter(|key| item.attributes().contains_key(*key))
                .map(|key| ConsumableKey::attribute(key.as_str())),
        );
        keys
    }
}

#[derive(Clone)]
pub enum ElementView {
    Definition(ViewElementDefinition),
    Creator(ElementCreator),
}

impl ElementView {
    pub fn creator(creator: impl Fn(&Item, &mut ConversionApi<'_>) -> Option<ViewNodeId> + 'static) -> Self {
        ElementView::Creator(Rc::new(creator))
    }

    fn into_creator(self) -> ElementCreator {
        match self {
            ElementView::Creator(creator) => creator,
            ElementView::Definition(definition) => {
                Rc::new(move |_, api| Some(definition.create_container(&mut api.writer)))
            }
        }
    }
}

impl From<&str> for ElementView {
    fn from(name: &str) -> Self {
        ElementView::Definition(name.into())
    }
}

impl From<ViewElementDefinition> for ElementView {
    fn from(definition: ViewElementDefinition) -> Self {
        ElementView::Definition(definition)
    }
}

pub struct ElementToElement {
    pub model: ModelConfig,
    pub view: ElementView,
    pub priority: Priority,
}

impl ElementToElement {
    pub fn new(model: impl Into<ModelConfig>, view: impl Into<ElementView>) -> Self {
        Self {
            model: model.into(),
            view: view.into(),
            priority: Priority::NORMAL,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

pub struct ElementToStructure {
    pub model: ModelConfig,
    pub view: StructureCreator,
    pub priority: Priority,
}

impl ElementToStructure {
    pub fn new(
        model: impl Into<ModelConfig>,
        view: impl Fn(&Item, &mut ConversionApi<'_>) -> ConversionResult<Option<Structure>> + 'static,
    ) -> Self {
        Self {
            model: model.into(),
            view: Rc::new(view),
            priority: Priority::NORMAL,
        }
    }
}

/// Picks the children a slot receives.
#[derive(Clone)]
pub enum SlotFilter {
    /// Every child of the element.
    Children,
    Matching(Rc<dyn Fn(&Item) -> bool>),
}

impl SlotFilter {
    fn matches(&self, item: &Item) -> bool {
        match self {
            SlotFilter::Children => true,
            SlotFilter::Matching(filter) => filter(item),
        }
    }
}

/// Placeholder inside a structure skeleton. Children assigned to it are
/// placed where it stands, then the placeholder is dropped.
#[derive(Clone)]
pub struct Slot {
    pub node: ViewNodeId,
    pub filter: SlotFilter,
}

impl Slot {
    pub fn filtered(writer: &mut DowncastWriter<'_>, filter: impl Fn(&Item) -> bool + 'static) -> Self {
        Self {
            node: writer.create_container_element("$slot", &[]),
            filter: SlotFilter::Matching(Rc::new(filter)),
        }
    }
}

/// Creates a slot from its mode name. Only `children` is known.
pub fn create_slot(writer: &mut DowncastWriter<'_>, mode: &str) -> ConversionResult<Slot> {
    if mode != "children" {
        return Err(ConversionError::SlotModeUnknown(mode.to_string()));
    }
    Ok(Slot {
        node: writer.create_container_element("$slot", &[]),
        filter: SlotFilter::Children,
    })
}

/// View skeleton of a structure and the slots inside it.
#[derive(Clone)]
pub struct Structure {
    pub element: ViewNodeId,
    pub slots: Vec<Slot>,
}

/// Inserts a single view element for a model element.
pub fn insert_element(
    creator: ElementCreator,
    model: ModelConfig,
) -> impl Fn(&mut EventInfo, &InsertData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    move |_, data, api| {
        let Item::Element { id, .. } = &data.item else {
            return Ok(());
        };
        let keys = model.consumable_keys(&data.item);
        if !keys.iter().all(|key| api.consumable.can_consume(&data.item, key)) {
            return Ok(());
        }
        let Some(view) = creator(&data.item, api) else {
            return Ok(());
        };
        api.consumable.consume_all(&data.item, &keys);
        let position = api.to_view_position(&data.range.start)?;
        api.mapper.bind_elements(*id, view);
        api.writer.insert(position, &[view])?;
        Ok(())
    }
}

/// Assigns each child to exactly one slot.
fn assign_children(name: &str, slots: &[Slot], children: &[Item]) -> ConversionResult<Vec<Vec<Item>>> {
    let mut assignment = vec![Vec::new(); slots.len()];
    for (index, child) in children.iter().enumerate() {
        let mut matching = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.filter.matches(child))
            .map(|(slot_index, _)| slot_index);
        let first = matching.next().ok_or_else(|| ConversionError::SlotFilterIncomplete {
            element: name.to_string(),
            index,
        })?;
        if matching.next().is_some() {
            return Err(ConversionError::SlotFilterOverlap {
                element: name.to_string(),
                index,
            });
        }
        assignment[first].push(child.clone());
    }
    Ok(assignment)
}

/// Inserts a structure of view elements for a model element and places
/// its children into the structure's slots.
pub fn insert_structure(
    creator: StructureCreator,
    model: ModelConfig,
) -> impl Fn(&mut EventInfo, &InsertData, &mut ConversionApi<'_>) -> ConversionResult<()> {
    move |_, data, api| {
        let Item::Element { id, name, .. } = &data.item else {
            return Ok(());
        };
        if api.schema.allows_text(name) {
            return Err(ConversionError::ElementToStructureDisallowedText { element: name.clone() });
        }
        let keys = model.consumable_keys(&data.item);
        if !keys.iter().all(|key| api.consumable.can_consume(&data.item, key)) {
            return Ok(());
        }
        let Some(structure) = creator(&data.item, api)? else {
            return Ok(());
        };
        let children = api
            .document
            .range_in(*id)
            .map(|range| api.document.items(&range, true))
            .unwrap_or_default();
        let assignment = assign_children(name, &structure.slots, &children)?;

        api.consumable.consume_all(&data.item, &keys);
        let position = api.to_view_position(&data.range.start)?;
        api.mapper.bind_elements(*id, structure.element);
        api.writer.insert(position, &[structure.element])?;

        for (slot, items) in structure.slots.iter().zip(&assignment) {
            for child in items {
                api.slot_placements.insert(child.start().clone(), slot.node);
            }
        }
        let filled = assignment
            .iter()
            .flatten()
            .try_for_each(|child| reinsert_or_convert_node(api, child, data.reconversion));
        for child in &children {
            api.slot_placements.remove(child.start());
        }
        filled?;

        for slot in &structure.slots {
            api.writer.remove_node(slot.node)?;
        }
        trace!(element = %id, slots = structure.slots.len(), "Filled structure slots");
        Ok(())
    }
}

/// Moves the existing view of `item` to its mapped position when
/// rebuilding a parent, or converts the item from scratch.
pub fn reinsert_or_convert_node(api: &mut ConversionApi<'_>, item: &Item, reconversion: bool) -> ConversionResult<()> {
    if reconversion {
        let existing = item.element_id().and_then(|id| api.mapper.to_view_element(id));
        if let Some(view) = existing.filter(|view| api.can_reuse_view(*view, item)) {
            let target = api.to_view_position(item.start())?;
            if let Some(source) = api.writer.document().range_on(view) {
                api.writer.move_range(source, target)?;
                return Ok(());
            }
        }
    }
    api.convert_item(item)
}

impl DowncastHelpers<'_> {
    fn map_triggers(&mut self, model: &ModelConfig) {
        for key in &model.attributes {
            let event = format!("attribute:{key}:{}", model.name);
            self.dispatcher.map_reconversion_trigger(&model.name, &event);
        }
        if model.children {
            let event = format!("children:{}", model.name);
            self.dispatcher.map_reconversion_trigger(&model.name, &event);
        }
    }

    pub fn element_to_element(&mut self, config: ElementToElement) -> &mut Self {
        let ElementToElement { model, view, priority } = config;
        self.map_triggers(&model);
        let event = format!("insert:{}", model.name);
        self.dispatcher
            .on_insert(event, priority, insert_element(view.into_creator(), model));
        self
    }

    pub fn element_to_structure(&mut self, config: ElementToStructure) -> &mut Self {
        let ElementToStructure { model, view, priority } = config;
        self.map_triggers(&model);
        let event = format!("insert:{}", model.name);
        self.dispatcher.on_insert(event, priority, insert_structure(view, model));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_model::{ElementId, Position};
    use scribe_view::ViewDocument;
    use serde_json::json;

    fn paragraph(index: usize) -> Item {
        Item::Element {
            id: ElementId(index as u64),
            name: "paragraph".to_string(),
            attributes: Default::default(),
            position: Position::new("main", vec![0, index]),
        }
    }

    #[test]
    fn test_unknown_slot_mode_is_rejected() {
        let mut view = ViewDocument::new();
        let mut writer = DowncastWriter::new(&mut view);
        assert!(create_slot(&mut writer, "children").is_ok());
        assert!(matches!(
            create_slot(&mut writer, "siblings"),
            Err(ConversionError::SlotModeUnknown(mode)) if mode == "siblings"
        ));
    }

    #[test]
    fn test_children_go_to_exactly_one_slot() {
        let mut view = ViewDocument::new();
        let mut writer = DowncastWriter::new(&mut view);
        let first = Slot::filtered(&mut writer, |item| item.start().offset() == 0);
        let rest = Slot::filtered(&mut writer, |item| item.start().offset() > 0);
        let children = vec![paragraph(0), paragraph(1), paragraph(2)];

        let assignment = assign_children("box", &[first.clone(), rest.clone()], &children).unwrap();
        assert_eq!(assignment[0].len(), 1);
        assert_eq!(assignment[1].len(), 2);

        let everything = create_slot(&mut writer, "children").unwrap();
        let overlap = assign_children("box", &[first.clone(), everything], &children);
        assert_eq!(
            overlap.unwrap_err(),
            ConversionError::SlotFilterOverlap {
                element: "box".to_string(),
                index: 0
            }
        );

        let incomplete = assign_children("box", &[first], &children);
        assert_eq!(
            incomplete.unwrap_err(),
            ConversionError::SlotFilterIncomplete {
                element: "box".to_string(),
                index: 1
            }
        );
    }

    #[test]
    fn test_consumed_attributes_follow_configuration() {
        let model = ModelConfig::from("heading").with_attribute("level");
        let mut item = paragraph(0);
        if let Item::Element { attributes, .. } = &mut item {
            attributes.insert("level".to_string(), json!(2));
            attributes.insert("align".to_string(), json!("left"));
        }
        assert_eq!(
            model.consumable_keys(&item),
            vec![ConsumableKey::Insert, ConsumableKey::attribute("level")]
        );
    }
}
