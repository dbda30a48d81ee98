//! Integration tests for editor crate

use scribe_editor::{Editor, EditorConfig, EditorError, REDO, UNDO};
use scribe_engine::{AttributeToElement, ElementToElement};
use scribe_model::{Attributes, Node, Position, Range, SchemaItem, Text, Writer};
use serde_json::json;

fn pos(path: &[usize]) -> Position {
    Position::new("main", path.to_vec())
}

fn paragraph(writer: &mut Writer<'_>, text: &str) -> Node {
    let paragraph = writer
        .create_element("paragraph")
        .with_children(vec![Node::Text(Text::new(text))]);
    Node::Element(paragraph)
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn editor(config: EditorConfig) -> anyhow::Result<Editor> {
    init_logging();
    let mut editor = Editor::new(config)?;
    editor.schema_mut().register(
        "paragraph",
        SchemaItem {
            allows_text: true,
            ..Default::default()
        },
    );
    editor
        .conversion()
        .element_to_element(ElementToElement::new("paragraph", "p"))
        .attribute_to_element(AttributeToElement::new("bold", "strong"));
    editor.set_data("main", |writer| {
        Ok(vec![Node::Element(writer.create_element("paragraph"))])
    })?;
    Ok(editor)
}

#[test]
fn test_undo_and_redo_update_the_view() -> anyhow::Result<()> {
    let mut editor = editor(EditorConfig::default())?;
    assert_eq!(editor.get_data("main")?, "<p></p>");
    assert!(!editor.is_enabled(UNDO));

    editor.change(|writer| writer.insert_text("foo", Attributes::new(), &pos(&[0, 0])))?;
    assert_eq!(editor.get_data("main")?, "<p>foo</p>");
    assert!(editor.is_enabled(UNDO));

    editor.execute(UNDO, None)?;
    assert_eq!(editor.get_data("main")?, "<p></p>");
    assert!(editor.is_enabled(REDO));

    editor.execute(REDO, None)?;
    assert_eq!(editor.get_data("main")?, "<p>foo</p>");
    assert!(!editor.is_enabled(REDO));
    Ok(())
}

#[test]
fn test_undo_removes_attribute_wrapper() -> anyhow::Result<()> {
    let mut editor = editor(EditorConfig::default())?;
    editor.change(|writer| writer.insert_text("foobar", Attributes::new(), &pos(&[0, 0])))?;
    editor.change(|writer| {
        writer.set_attribute("bold", json!(true), &Range::new(pos(&[0, 1]), pos(&[0, 3])))
    })?;
    assert_eq!(editor.get_data("main")?, "<p>f<strong>oo</strong>bar</p>");

    editor.execute(UNDO, None)?;
    assert_eq!(editor.get_data("main")?, "<p>foobar</p>");
    Ok(())
}

#[test]
fn test_set_data_clears_history() -> anyhow::Result<()> {
    let mut editor = editor(EditorConfig::default())?;
    editor.change(|writer| writer.insert_text("foo", Attributes::new(), &pos(&[0, 0])))?;
    editor.change(|writer| writer.insert_text("bar", Attributes::new(), &pos(&[0, 3])))?;
    editor.execute(UNDO, None)?;
    assert!(editor.is_enabled(UNDO));
    assert!(editor.is_enabled(REDO));

    editor.set_data("main", |writer| Ok(vec![paragraph(writer, "baz")]))?;
    assert_eq!(editor.get_data("main")?, "<p>baz</p>");
    assert!(!editor.is_enabled(UNDO));
    assert!(!editor.is_enabled(REDO));
    Ok(())
}

#[test]
fn test_undo_restores_removed_paragraph_after_later_undo() -> anyhow::Result<()> {
    let mut editor = editor(EditorConfig::default())?;
    editor.set_data("main", |writer| Ok(vec![paragraph(writer, "foo"), paragraph(writer, "bar")]))?;
    assert_eq!(editor.get_data("main")?, "<p>foo</p><p>bar</p>");

    editor.change(|writer| writer.remove(&Range::new(pos(&[0]), pos(&[1]))))?;
    editor.change(|writer| {
        let bold = Attributes::from([("bold".to_string(), json!(true))]);
        writer.insert_text("X", bold, &pos(&[0, 3]))
    })?;
    assert_eq!(editor.get_data("main")?, "<p>bar<strong>X</strong></p>");

    editor.execute(UNDO, None)?;
    assert_eq!(editor.get_data("main")?, "<p>bar</p>");

    editor.execute(UNDO, None)?;
    assert_eq!(editor.get_data("main")?, "<p>foo</p><p>bar</p>");
    Ok(())
}

#[test]
fn test_disabled_and_unknown_commands() -> anyhow::Result<()> {
    let mut editor = editor(EditorConfig::default())?;

    let error = editor.execute(UNDO, None).unwrap_err();
    assert!(matches!(error, EditorError::CommandDisabled(ref name) if name == UNDO));

    let error = editor.execute("bold", None).unwrap_err();
    assert!(matches!(error, EditorError::UnknownCommand(ref name) if name == "bold"));
    assert!(!editor.is_enabled("bold"));
    Ok(())
}

#[test]
fn test_step_limit_from_config() -> anyhow::Result<()> {
    let config = EditorConfig::from_json_str(r#"{ "undo": { "step_limit": 2 } }"#)?;
    let mut editor = editor(config)?;
    for (offset, text) in ["a", "b", "c"].into_iter().enumerate() {
        editor.change(|writer| writer.insert_text(text, Attributes::new(), &pos(&[0, offset])))?;
    }
    assert_eq!(editor.get_data("main")?, "<p>abc</p>");

    editor.execute(UNDO, None)?;
    editor.execute(UNDO, None)?;
    assert_eq!(editor.get_data("main")?, "<p>a</p>");
    assert!(!editor.is_enabled(UNDO));
    Ok(())
}

#[test]
fn test_failed_change_is_reported() -> anyhow::Result<()> {
    let mut editor = editor(EditorConfig::default())?;
    let error = editor
        .change(|writer| writer.insert_text("foo", Attributes::new(), &pos(&[5, 0])))
        .unwrap_err();
    assert!(matches!(error, EditorError::Model(_)));
    assert_eq!(editor.get_data("main")?, "<p></p>");
    Ok(())
}
