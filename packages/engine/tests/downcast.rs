use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use scribe_engine::{
    create_slot, register_default_converters, AttributeModel, AttributeToAttribute,
    AttributeToElement, AttributeView, ConversionError, DowncastContext, DowncastDispatcher,
    DowncastHelpers, ElementToElement, ElementToStructure, ElementView, Mapper, ModelConfig,
    Priority, Slot, Structure, ViewAttribute, ViewAttributeValue,
};
use scribe_model::{Attributes, BatchType, ElementId, Model, ModelResult, Position, Range, SchemaItem, Writer};
use scribe_view::{stringify, ViewDocument};
use serde_json::json;

fn pos(path: &[usize]) -> Position {
    Position::new("main", path.to_vec())
}

fn bold() -> Attributes {
    Attributes::from([("bold".to_string(), json!(true))])
}

struct Editing {
    model: Model,
    view: ViewDocument,
    mapper: Mapper,
    dispatcher: DowncastDispatcher,
}

impl Editing {
    fn new(configure: impl FnOnce(&mut DowncastHelpers<'_>)) -> anyhow::Result<Self> {
        let mut model = Model::new(&["main"]);
        let text_block = SchemaItem {
            allows_text: true,
            ..Default::default()
        };
        model.schema_mut().register("paragraph", text_block.clone());
        model.schema_mut().register("heading", text_block.clone());
        model.schema_mut().register("heading2", text_block);
        model.schema_mut().register("listItem", SchemaItem::default());

        let mut view = ViewDocument::new();
        let root = view.create_root("main", "div");
        let mut mapper = Mapper::new();
        mapper.bind_elements(model.document().root("main")?.id, root);

        let mut dispatcher = DowncastDispatcher::new();
        register_default_converters(&mut dispatcher);
        configure(&mut DowncastHelpers::new(&mut dispatcher));
        Ok(Self {
            model,
            view,
            mapper,
            dispatcher,
        })
    }

    fn change(&mut self, block: impl FnOnce(&mut Writer<'_>) -> ModelResult<()>) -> anyhow::Result<()> {
        self.model.change(BatchType::DEFAULT, block)?;
        self.convert()
    }

    fn convert(&mut self) -> anyhow::Result<()> {
        let mut cx = DowncastContext::new(
            self.model.document(),
            self.model.schema(),
            &mut self.mapper,
            &mut self.view,
        );
        let converted = self
            .dispatcher
            .convert_changes(&mut cx)
            .and_then(|_| self.dispatcher.convert_selection(&mut cx));
        self.model.document_mut().reset_differ();
        Ok(converted?)
    }

    fn data(&self) -> anyhow::Result<String> {
        Ok(stringify(&self.view, self.view.root("main")?))
    }
}

fn paragraphs(helpers: &mut DowncastHelpers<'_>) {
    helpers.element_to_element(ElementToElement::new("paragraph", "p"));
}

/// `<listItem>` renders as a todo item. A paragraph first child is the item
/// description and goes into a content wrapper; anything else sits next to
/// the label.
fn todo_list(helpers: &mut DowncastHelpers<'_>) {
    helpers
        .element_to_element(ElementToElement::new("paragraph", "p"))
        .element_to_element(ElementToElement::new("heading2", "h2"))
        .element_to_structure(ElementToStructure::new(
            ModelConfig::from("listItem").with_children(),
            |item, api| {
                let Some(id) = item.element_id() else {
                    return Ok(None);
                };
                let described = api
                    .document
                    .element(id)
                    .and_then(|element| element.children.first())
                    .is_some_and(|child| child.name() == "paragraph");

                let writer = &mut api.writer;
                let li = writer.create_container_element("li", &[]);
                let label = writer.create_container_element("span", &[]);
                writer.add_class(&["todo-list__label"], label);
                if !described {
                    writer.add_class(&["todo-list__label_without-description"], label);
                }
                let checkbox = writer.create_empty_element("input", &[]);
                writer.append_child(label, checkbox);
                writer.append_child(li, label);

                let slot = create_slot(writer, "children")?;
                if described {
                    let content = writer.create_container_element("span", &[]);
                    writer.add_class(&["todo-list__content"], content);
                    writer.append_child(content, slot.node);
                    writer.append_child(li, content);
                } else {
                    writer.append_child(li, slot.node);
                }
                Ok(Some(Structure {
                    element: li,
                    slots: vec![slot],
                }))
            },
        ));
}

fn insert_todo(editing: &mut Editing, text: &str) -> anyhow::Result<ElementId> {
    let mut paragraph = None;
    editing.change(|writer| {
        writer.insert_element("listItem", Attributes::new(), &pos(&[0]))?;
        paragraph = Some(writer.insert_element("paragraph", Attributes::new(), &pos(&[0, 0]))?);
        writer.insert_text(text, Attributes::new(), &pos(&[0, 0, 0]))
    })?;
    paragraph.ok_or_else(|| anyhow::anyhow!("paragraph was not inserted"))
}

#[test]
fn test_paragraphs_with_caret() -> anyhow::Result<()> {
    let mut editing = Editing::new(paragraphs)?;
    editing.change(|writer| {
        for index in 0..3 {
            writer.insert_element("paragraph", Attributes::new(), &pos(&[index]))?;
        }
        writer.insert_text("foo", Attributes::new(), &pos(&[0, 0]))?;
        writer.insert_text("bar", Attributes::new(), &pos(&[2, 0]))?;
        writer.set_selection_at(pos(&[0, 1]));
        Ok(())
    })?;

    assert_eq!(editing.data()?, "<p>f{}oo</p><p></p><p>bar</p>");
    Ok(())
}

#[test]
fn test_renaming_todo_description_rebuilds_item_once() -> anyhow::Result<()> {
    let mut editing = Editing::new(todo_list)?;
    let reconversions = Rc::new(Cell::new(0));
    let counter = reconversions.clone();
    editing
        .dispatcher
        .on_insert("insert:listItem", Priority::HIGHEST, move |_, data, _| {
            if data.reconversion {
                counter.set(counter.get() + 1);
            }
            Ok(())
        });

    let paragraph = insert_todo(&mut editing, "x")?;
    assert_eq!(
        editing.data()?,
        "<li><span class=\"todo-list__label\"><input></input></span>\
         <span class=\"todo-list__content\"><p>x</p></span></li>"
    );

    editing.change(|writer| writer.rename(paragraph, "heading2"))?;
    assert_eq!(reconversions.get(), 1);
    assert_eq!(
        editing.data()?,
        "<li><span class=\"todo-list__label todo-list__label_without-description\"><input></input></span>\
         <h2>x</h2></li>"
    );
    Ok(())
}

#[test]
fn test_reconversion_keeps_child_views() -> anyhow::Result<()> {
    let mut editing = Editing::new(todo_list)?;
    let first = insert_todo(&mut editing, "x")?;
    let list_item = editing.model.document().element_at("main", &[0])?.id;
    let old_item_view = editing.mapper.to_view_element(list_item);
    let first_view = editing.mapper.to_view_element(first);

    editing.change(|writer| {
        writer.insert_element("paragraph", Attributes::new(), &pos(&[0, 1]))?;
        writer.insert_text("y", Attributes::new(), &pos(&[0, 1, 0]))
    })?;

    assert_eq!(
        editing.data()?,
        "<li><span class=\"todo-list__label\"><input></input></span>\
         <span class=\"todo-list__content\"><p>x</p><p>y</p></span></li>"
    );
    assert_eq!(editing.mapper.to_view_element(first), first_view);
    assert_ne!(editing.mapper.to_view_element(list_item), old_item_view);
    Ok(())
}

#[test]
fn test_reconversion_keeps_changes_inside_children() -> anyhow::Result<()> {
    let mut editing = Editing::new(todo_list)?;
    insert_todo(&mut editing, "x")?;

    editing.change(|writer| {
        writer.insert_text("z", Attributes::new(), &pos(&[0, 0, 1]))?;
        writer.insert_element("paragraph", Attributes::new(), &pos(&[0, 1]))?;
        writer.insert_text("y", Attributes::new(), &pos(&[0, 1, 0]))
    })?;

    assert_eq!(
        editing.data()?,
        "<li><span class=\"todo-list__label\"><input></input></span>\
         <span class=\"todo-list__content\"><p>xz</p><p>y</p></span></li>"
    );
    Ok(())
}

#[test]
fn test_attribute_trigger_rebuilds_element() -> anyhow::Result<()> {
    let mut editing = Editing::new(|helpers| {
        let heading = ElementView::creator(|item, api| {
            let level = item.attributes().get("level").and_then(|level| level.as_u64())?;
            Some(api.writer.create_container_element(&format!("h{level}"), &[]))
        });
        helpers.element_to_element(ElementToElement::new(
            ModelConfig::from("heading").with_attribute("level"),
            heading,
        ));
    })?;
    let mut heading = None;
    editing.change(|writer| {
        let attributes = Attributes::from([("level".to_string(), json!(2))]);
        heading = Some(writer.insert_element("heading", attributes, &pos(&[0]))?);
        writer.insert_text("foo", Attributes::new(), &pos(&[0, 0]))
    })?;
    assert_eq!(editing.data()?, "<h2>foo</h2>");

    let heading = heading.ok_or_else(|| anyhow::anyhow!("heading was not inserted"))?;
    editing.change(|writer| writer.set_element_attribute(heading, "level", json!(3)))?;
    assert_eq!(editing.data()?, "<h3>foo</h3>");

    editing.change(|writer| {
        writer.set_element_attribute(heading, "level", json!(4))?;
        writer.insert_text("!", Attributes::new(), &pos(&[0, 3]))
    })?;
    assert_eq!(editing.data()?, "<h4>foo!</h4>");
    Ok(())
}

#[test]
fn test_structure_rejects_unassigned_children() -> anyhow::Result<()> {
    let mut editing = Editing::new(|helpers| {
        helpers
            .element_to_element(ElementToElement::new("paragraph", "p"))
            .element_to_structure(ElementToStructure::new("listItem", |_, api| {
                let li = api.writer.create_container_element("li", &[]);
                let slot = Slot::filtered(&mut api.writer, |child| child.name() == "heading2");
                api.writer.append_child(li, slot.node);
                Ok(Some(Structure {
                    element: li,
                    slots: vec![slot],
                }))
            }));
    })?;

    let error = insert_todo(&mut editing, "x").unwrap_err();
    assert_eq!(
        error.downcast_ref::<ConversionError>(),
        Some(&ConversionError::SlotFilterIncomplete {
            element: "listItem".to_string(),
            index: 0,
        })
    );
    Ok(())
}

#[test]
fn test_structure_for_text_block_is_rejected() -> anyhow::Result<()> {
    let mut editing = Editing::new(|helpers| {
        helpers.element_to_structure(ElementToStructure::new("paragraph", |_, api| {
            let element = api.writer.create_container_element("p", &[]);
            Ok(Some(Structure {
                element,
                slots: Vec::new(),
            }))
        }));
    })?;
    let error = editing
        .change(|writer| writer.insert_element("paragraph", Attributes::new(), &pos(&[0])).map(|_| ()))
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<ConversionError>(),
        Some(ConversionError::ElementToStructureDisallowedText { element }) if element == "paragraph"
    ));
    Ok(())
}

#[test]
fn test_consumed_insert_is_not_converted_twice() -> anyhow::Result<()> {
    let mut editing = Editing::new(paragraphs)?;
    editing.dispatcher.on_insert("insert:paragraph", Priority::HIGH, |_, data, api| {
        let Some(id) = data.item.element_id() else {
            return Ok(());
        };
        if !api.consumable.consume(&data.item, &scribe_engine::ConsumableKey::Insert) {
            return Ok(());
        }
        let position = api.to_view_position(&data.range.start)?;
        let element = api.writer.create_container_element("section", &[]);
        api.mapper.bind_elements(id, element);
        api.writer.insert(position, &[element])?;
        Ok(())
    });
    editing.change(|writer| {
        writer.insert_element("paragraph", Attributes::new(), &pos(&[0]))?;
        writer.insert_text("foo", Attributes::new(), &pos(&[0, 0]))
    })?;

    assert_eq!(editing.data()?, "<section>foo</section>");
    Ok(())
}

#[test]
fn test_bold_text_wraps_and_unwraps() -> anyhow::Result<()> {
    let mut editing = Editing::new(|helpers| {
        helpers
            .element_to_element(ElementToElement::new("paragraph", "p"))
            .attribute_to_element(AttributeToElement::new("bold", "strong"));
    })?;
    editing.change(|writer| {
        writer.insert_element("paragraph", Attributes::new(), &pos(&[0]))?;
        writer.insert_text("foo", Attributes::new(), &pos(&[0, 0]))?;
        writer.insert_text("bar", bold(), &pos(&[0, 3]))
    })?;
    assert_eq!(editing.data()?, "<p>foo<strong>bar</strong></p>");

    editing.change(|writer| writer.remove_attribute("bold", &Range::new(pos(&[0, 3]), pos(&[0, 5]))))?;
    assert_eq!(editing.data()?, "<p>fooba<strong>r</strong></p>");
    Ok(())
}

#[test]
fn test_selection_attribute_renders_empty_wrapper_at_caret() -> anyhow::Result<()> {
    let mut editing = Editing::new(|helpers| {
        helpers
            .element_to_element(ElementToElement::new("paragraph", "p"))
            .attribute_to_element(AttributeToElement::new("bold", "strong"));
    })?;
    editing.change(|writer| {
        writer.insert_element("paragraph", Attributes::new(), &pos(&[0]))?;
        writer.insert_text("foo", Attributes::new(), &pos(&[0, 0]))?;
        writer.set_selection_at(pos(&[0, 1]));
        writer.set_selection_attribute("bold", json!(true));
        Ok(())
    })?;

    assert_eq!(editing.data()?, "<p>f<strong>[]</strong>oo</p>");
    Ok(())
}

#[test]
fn test_removed_elements_lose_their_view() -> anyhow::Result<()> {
    let mut editing = Editing::new(paragraphs)?;
    let mut ids = Vec::new();
    editing.change(|writer| {
        for (index, text) in ["a", "b", "c"].into_iter().enumerate() {
            ids.push(writer.insert_element("paragraph", Attributes::new(), &pos(&[index]))?);
            writer.insert_text(text, Attributes::new(), &pos(&[index, 0]))?;
        }
        Ok(())
    })?;
    assert!(editing.mapper.to_view_element(ids[1]).is_some());

    editing.change(|writer| writer.remove_element(ids[1]))?;
    assert_eq!(editing.data()?, "<p>a</p><p>c</p>");
    assert_eq!(editing.mapper.to_view_element(ids[1]), None);
    assert!(editing.mapper.to_view_element(ids[2]).is_some());
    Ok(())
}

#[test]
fn test_attribute_to_attribute() -> anyhow::Result<()> {
    let mut editing = Editing::new(|helpers| {
        let alignment = AttributeView::creator(|value, _| {
            Some(ViewAttribute {
                key: "style".to_string(),
                value: ViewAttributeValue::Styles(BTreeMap::from([(
                    "text-align".to_string(),
                    value.as_str()?.to_string(),
                )])),
            })
        });
        helpers
            .element_to_element(ElementToElement::new("paragraph", "p"))
            .attribute_to_attribute(AttributeToAttribute::new(
                AttributeModel::from("alignment").on("paragraph"),
                alignment,
            ))
            .attribute_to_attribute(AttributeToAttribute::new("href", "href"));
    })?;
    let mut paragraph = None;
    editing.change(|writer| {
        let attributes = Attributes::from([("alignment".to_string(), json!("right"))]);
        paragraph = Some(writer.insert_element("paragraph", attributes, &pos(&[0]))?);
        writer.insert_text("foo", Attributes::new(), &pos(&[0, 0]))
    })?;
    assert_eq!(editing.data()?, "<p style=\"text-align:right;\">foo</p>");

    let paragraph = paragraph.ok_or_else(|| anyhow::anyhow!("paragraph was not inserted"))?;
    editing.change(|writer| writer.set_element_attribute(paragraph, "alignment", json!("center")))?;
    assert_eq!(editing.data()?, "<p style=\"text-align:center;\">foo</p>");

    editing.change(|writer| writer.remove_element_attribute(paragraph, "alignment"))?;
    assert_eq!(editing.data()?, "<p>foo</p>");

    let link = Attributes::from([("href".to_string(), json!("a.html"))]);
    let error = editing
        .change(|writer| writer.insert_text("link", link, &pos(&[0, 3])))
        .unwrap_err();
    assert_eq!(
        error.downcast_ref::<ConversionError>(),
        Some(&ConversionError::AttributeToAttributeOnText {
            key: "href".to_string()
        })
    );
    Ok(())
}
