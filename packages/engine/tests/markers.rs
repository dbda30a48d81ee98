use std::rc::Rc;

use scribe_engine::{
    register_default_converters, DowncastContext, DowncastDispatcher, DowncastHelpers, ElementToElement,
    ElementView, Mapper, MarkerToData, MarkerToElement, MarkerToHighlight,
};
use scribe_model::{Attributes, BatchType, Model, ModelResult, Position, Range, SchemaItem, Writer};
use scribe_view::{stringify, DowncastWriter, HighlightDescriptor, HighlightHandler, ViewDocument, ViewNodeId};

fn pos(path: &[usize]) -> Position {
    Position::new("main", path.to_vec())
}

fn range(start: &[usize], end: &[usize]) -> Range {
    Range::new(pos(start), pos(end))
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
        model.schema_mut().register(
            "paragraph",
            SchemaItem {
                allows_text: true,
                ..Default::default()
            },
        );
        model.schema_mut().register(
            "image",
            SchemaItem {
                is_object: true,
                ..Default::default()
            },
        );

        let mut view = ViewDocument::new();
        let root = view.create_root("main", "div");
        let mut mapper = Mapper::new();
        mapper.bind_elements(model.document().root("main")?.id, root);

        let mut dispatcher = DowncastDispatcher::new();
        register_default_converters(&mut dispatcher);
        {
            let mut helpers = DowncastHelpers::new(&mut dispatcher);
            helpers.element_to_element(ElementToElement::new("paragraph", "p"));
            configure(&mut helpers);
        }
        Ok(Self {
            model,
            view,
            mapper,
            dispatcher,
        })
    }

    /// Starts from `<paragraph>foobar</paragraph>`.
    fn with_paragraph(configure: impl FnOnce(&mut DowncastHelpers<'_>)) -> anyhow::Result<Self> {
        let mut editing = Self::new(configure)?;
        editing.change(|writer| {
            writer.insert_element("paragraph", Attributes::new(), &pos(&[0]))?;
            writer.insert_text("foobar", Attributes::new(), &pos(&[0, 0]))
        })?;
        Ok(editing)
    }

    fn change(&mut self, block: impl FnOnce(&mut Writer<'_>) -> ModelResult<()>) -> anyhow::Result<()> {
        self.model.change(BatchType::DEFAULT, block)?;
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

fn mark() -> HighlightDescriptor {
    HighlightDescriptor {
        classes: vec!["mark".to_string()],
        ..Default::default()
    }
}

#[test]
fn test_marker_boundaries_as_ui_elements() -> anyhow::Result<()> {
    let mut editing = Editing::with_paragraph(|helpers| {
        helpers.marker_to_element(MarkerToElement::new("search", "search-marker"));
    })?;

    editing.change(|writer| writer.add_marker("search:1", range(&[0, 1], &[0, 3]), false))?;
    assert_eq!(
        editing.data()?,
        "<p>f<search-marker></search-marker>oo<search-marker></search-marker>bar</p>"
    );

    editing.change(|writer| writer.remove_marker("search:1"))?;
    assert_eq!(editing.data()?, "<p>foobar</p>");
    Ok(())
}

#[test]
fn test_collapsed_marker_renders_one_element() -> anyhow::Result<()> {
    let mut editing = Editing::with_paragraph(|helpers| {
        helpers.marker_to_element(MarkerToElement::new("search", "search-marker"));
    })?;

    editing.change(|writer| writer.add_marker("search:1", range(&[0, 2], &[0, 2]), false))?;
    assert_eq!(editing.data()?, "<p>fo<search-marker></search-marker>obar</p>");
    Ok(())
}

#[test]
fn test_marker_data_inside_text() -> anyhow::Result<()> {
    let mut editing = Editing::with_paragraph(|helpers| {
        helpers.marker_to_data(MarkerToData::new("comment"));
    })?;

    editing.change(|writer| writer.add_marker("comment:1", range(&[0, 1], &[0, 3]), false))?;
    assert_eq!(
        editing.data()?,
        "<p>f<comment-start name=\"1\"></comment-start>oo<comment-end name=\"1\"></comment-end>bar</p>"
    );

    editing.change(|writer| writer.remove_marker("comment:1"))?;
    assert_eq!(editing.data()?, "<p>foobar</p>");
    Ok(())
}

#[test]
fn test_marker_data_around_elements() -> anyhow::Result<()> {
    let mut editing = Editing::with_paragraph(|helpers| {
        helpers.marker_to_data(MarkerToData::new("comment"));
    })?;

    editing.change(|writer| writer.add_marker("comment:1", range(&[0], &[1]), false))?;
    assert_eq!(
        editing.data()?,
        "<p data-comment-end-after=\"1\" data-comment-start-before=\"1\">foobar</p>"
    );

    editing.change(|writer| writer.add_marker("comment:2", range(&[0], &[1]), false))?;
    assert_eq!(
        editing.data()?,
        "<p data-comment-end-after=\"2,1\" data-comment-start-before=\"2,1\">foobar</p>"
    );

    editing.change(|writer| writer.remove_marker("comment:1"))?;
    assert_eq!(
        editing.data()?,
        "<p data-comment-end-after=\"2\" data-comment-start-before=\"2\">foobar</p>"
    );

    editing.change(|writer| writer.remove_marker("comment:2"))?;
    assert_eq!(editing.data()?, "<p>foobar</p>");
    Ok(())
}

#[test]
fn test_text_highlight_is_added_and_removed() -> anyhow::Result<()> {
    let mut editing = Editing::with_paragraph(|helpers| {
        helpers.marker_to_highlight(MarkerToHighlight::new("mark", mark()));
    })?;

    editing.change(|writer| writer.add_marker("mark:1", range(&[0, 1], &[0, 3]), false))?;
    assert_eq!(editing.data()?, "<p>f<span class=\"mark\">oo</span>bar</p>");

    editing.change(|writer| writer.remove_marker("mark:1"))?;
    assert_eq!(editing.data()?, "<p>foobar</p>");
    Ok(())
}

#[test]
fn test_highlight_across_paragraphs() -> anyhow::Result<()> {
    let mut editing = Editing::with_paragraph(|helpers| {
        helpers.marker_to_highlight(MarkerToHighlight::new("mark", mark()));
    })?;
    editing.change(|writer| {
        writer.insert_element("paragraph", Attributes::new(), &pos(&[1]))?;
        writer.insert_text("baz", Attributes::new(), &pos(&[1, 0]))
    })?;

    editing.change(|writer| writer.add_marker("mark:1", range(&[0, 3], &[1, 2]), false))?;
    assert_eq!(
        editing.data()?,
        "<p>foo<span class=\"mark\">bar</span></p><p><span class=\"mark\">ba</span>z</p>"
    );

    editing.change(|writer| writer.remove_marker("mark:1"))?;
    assert_eq!(editing.data()?, "<p>foobar</p><p>baz</p>");
    Ok(())
}

#[test]
fn test_element_highlight_goes_through_handler() -> anyhow::Result<()> {
    let mut editing = Editing::new(|helpers| {
        let figure = ElementView::creator(|_, api| {
            let figure = api.writer.create_container_element("figure", &[]);
            api.writer.set_highlight_handler(
                figure,
                HighlightHandler {
                    add: Rc::new(|writer: &mut DowncastWriter<'_>, element: ViewNodeId, descriptor: &HighlightDescriptor| {
                        let classes: Vec<&str> = descriptor.classes.iter().map(String::as_str).collect();
                        writer.add_class(&classes, element);
                    }),
                    remove: Rc::new(|writer: &mut DowncastWriter<'_>, element: ViewNodeId, _: &str| {
                        writer.remove_class(&["mark"], element)
                    }),
                },
            );
            Some(figure)
        });
        helpers
            .element_to_element(ElementToElement::new("image", figure))
            .marker_to_highlight(MarkerToHighlight::new("mark", mark()));
    })?;
    editing.change(|writer| writer.insert_element("image", Attributes::new(), &pos(&[0])).map(|_| ()))?;

    editing.change(|writer| writer.add_marker("mark:1", range(&[0], &[1]), false))?;
    assert_eq!(editing.data()?, "<figure class=\"mark\"></figure>");

    editing.change(|writer| writer.remove_marker("mark:1"))?;
    assert_eq!(editing.data()?, "<figure></figure>");
    Ok(())
}

#[test]
fn test_caret_inside_handled_element_gets_no_highlight_span() -> anyhow::Result<()> {
    let mut editing = Editing::new(|helpers| {
        let caption = ElementView::creator(|_, api| {
            let caption = api.writer.create_container_element("figcaption", &[]);
            api.writer.set_highlight_handler(
                caption,
                HighlightHandler {
                    add: Rc::new(|writer: &mut DowncastWriter<'_>, element: ViewNodeId, descriptor: &HighlightDescriptor| {
                        let classes: Vec<&str> = descriptor.classes.iter().map(String::as_str).collect();
                        writer.add_class(&classes, element);
                    }),
                    remove: Rc::new(|writer: &mut DowncastWriter<'_>, element: ViewNodeId, _: &str| {
                        writer.remove_class(&["mark"], element)
                    }),
                },
            );
            Some(caption)
        });
        helpers
            .element_to_element(ElementToElement::new("caption", caption))
            .marker_to_highlight(MarkerToHighlight::new("mark", mark()));
    })?;
    editing.model.schema_mut().register(
        "caption",
        SchemaItem {
            allows_text: true,
            ..Default::default()
        },
    );
    editing.change(|writer| {
        writer.insert_element("caption", Attributes::new(), &pos(&[0]))?;
        writer.insert_text("foo", Attributes::new(), &pos(&[0, 0]))
    })?;

    editing.change(|writer| {
        writer.add_marker("mark:1", range(&[0], &[1]), false)?;
        writer.set_selection_at(pos(&[0, 1]));
        Ok(())
    })?;
    assert_eq!(editing.data()?, "<figcaption class=\"mark\">f{}oo</figcaption>");
    Ok(())
}
