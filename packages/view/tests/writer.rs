use scribe_view::{stringify, DowncastWriter, ViewDocument, ViewNodeId, ViewPosition, ViewRange};

/// Root with a single `<p>` holding `text`.
fn document_with(text: &str) -> anyhow::Result<(ViewDocument, ViewNodeId, ViewNodeId, ViewNodeId)> {
    let mut document = ViewDocument::new();
    let root = document.create_root("main", "div");
    let mut writer = DowncastWriter::new(&mut document);
    let p = writer.create_container_element("p", &[]);
    let t = writer.create_text(text);
    writer.append_child(p, t);
    writer.insert(ViewPosition::new(root, 0), &[p])?;
    Ok((document, root, p, t))
}

fn text_range(t: ViewNodeId, start: usize, end: usize) -> ViewRange {
    ViewRange::new(ViewPosition::new(t, start), ViewPosition::new(t, end))
}

#[test]
fn test_lower_priority_wraps_outside() -> anyhow::Result<()> {
    let (mut document, root, p, t) = document_with("foo")?;
    let mut writer = DowncastWriter::new(&mut document);
    let strong = writer.create_attribute_element("strong", &[], 10, None);
    writer.wrap(text_range(t, 0, 3), strong)?;

    let link = writer.create_attribute_element("a", &[("href", "x")], 5, None);
    writer.wrap(ViewRange::new(ViewPosition::new(p, 0), ViewPosition::new(p, 1)), link)?;

    let em = writer.create_attribute_element("em", &[], 20, None);
    writer.wrap(ViewRange::new(ViewPosition::new(p, 0), ViewPosition::new(p, 1)), em)?;

    assert_eq!(
        stringify(&document, root),
        "<p><a href=\"x\"><strong><em>foo</em></strong></a></p>"
    );
    Ok(())
}

#[test]
fn test_spans_with_different_ids_stay_apart() -> anyhow::Result<()> {
    let (mut document, root, p, t) = document_with("foobar")?;
    let mut writer = DowncastWriter::new(&mut document);
    let first = writer.create_attribute_element("span", &[], 10, Some("mark:1"));
    writer.add_class(&["mark"], first);
    writer.wrap(text_range(t, 0, 3), first)?;

    let second = writer.create_attribute_element("span", &[], 10, Some("mark:2"));
    writer.add_class(&["mark"], second);
    writer.wrap(ViewRange::new(ViewPosition::new(p, 1), ViewPosition::new(p, 2)), second)?;
    assert_eq!(
        stringify(&document, root),
        "<p><span class=\"mark\">foo</span><span class=\"mark\">bar</span></p>"
    );

    let mut writer = DowncastWriter::new(&mut document);
    let wrapped = writer.document().children(p)[0];
    writer.unwrap_element(wrapped)?;
    assert_eq!(stringify(&document, root), "<p>foo<span class=\"mark\">bar</span></p>");
    Ok(())
}

#[test]
fn test_ui_elements_do_not_break_attributes() -> anyhow::Result<()> {
    let (mut document, root, _, t) = document_with("foo")?;
    let mut writer = DowncastWriter::new(&mut document);
    let strong = writer.create_attribute_element("strong", &[], 10, None);
    writer.wrap(text_range(t, 0, 3), strong)?;

    let marker = writer.create_ui_element("marker", &[]);
    writer.insert(ViewPosition::new(t, 1), &[marker])?;
    assert_eq!(
        stringify(&document, root),
        "<p><strong>f<marker></marker>oo</strong></p>"
    );

    let mut writer = DowncastWriter::new(&mut document);
    writer.remove_node(marker)?;
    assert_eq!(stringify(&document, root), "<p><strong>foo</strong></p>");
    Ok(())
}

#[test]
fn test_styles_classes_and_attributes_render_sorted() -> anyhow::Result<()> {
    let (mut document, root, p, _) = document_with("foo")?;
    let mut writer = DowncastWriter::new(&mut document);
    writer.add_class(&["todo", "done"], p);
    writer.set_style("color", "red", p);
    writer.set_style("background", "blue", p);
    writer.set_attribute("data-z", "1", p);
    writer.set_attribute("data-a", "2", p);
    assert_eq!(
        stringify(&document, root),
        "<p class=\"done todo\" style=\"background:blue;color:red;\" data-a=\"2\" data-z=\"1\">foo</p>"
    );

    let mut writer = DowncastWriter::new(&mut document);
    writer.remove_class(&["done"], p);
    writer.remove_style("color", p);
    writer.remove_attribute("data-z", p);
    assert_eq!(
        stringify(&document, root),
        "<p class=\"todo\" style=\"background:blue;\" data-a=\"2\">foo</p>"
    );
    Ok(())
}

#[test]
fn test_move_paragraph_after_its_sibling() -> anyhow::Result<()> {
    let (mut document, root, p, _) = document_with("foo")?;
    let mut writer = DowncastWriter::new(&mut document);
    let second = writer.create_container_element("p", &[]);
    let bar = writer.create_text("bar");
    writer.append_child(second, bar);
    writer.insert(ViewPosition::new(root, 1), &[second])?;

    writer.move_range(
        ViewRange::new(ViewPosition::new(root, 0), ViewPosition::new(root, 1)),
        ViewPosition::new(root, 2),
    )?;
    assert_eq!(stringify(&document, root), "<p>bar</p><p>foo</p>");
    assert_eq!(document.index_in_parent(p), Some(1));
    Ok(())
}

#[test]
fn test_selection_renders_in_text_and_between_elements() -> anyhow::Result<()> {
    let (mut document, root, _, t) = document_with("foo")?;
    let mut writer = DowncastWriter::new(&mut document);
    writer.set_selection(
        vec![
            ViewRange::collapsed(ViewPosition::new(t, 1)),
            ViewRange::new(ViewPosition::new(root, 0), ViewPosition::new(root, 1)),
        ],
        false,
    );
    assert_eq!(stringify(&document, root), "[<p>f{}oo</p>]");
    Ok(())
}
