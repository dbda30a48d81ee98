//! Compact string form of a view root, used mostly by tests.
//!
//! Selection boundaries render as `{`/`}` inside text and `[`/`]` between
//! nodes. Element attributes come out as `class`, then `style`, then the rest
//! sorted by key.

use crate::document::{ViewDocument, ViewPosition};
use crate::node::ViewNodeId;

pub fn stringify(document: &ViewDocument, root: ViewNodeId) -> String {
    let mut out = String::new();
    write_children(document, root, &mut out);
    out
}

fn write_marks(document: &ViewDocument, position: ViewPosition, out: &mut String) {
    let (open, close) = if document[position.parent].is_text() {
        ('{', '}')
    } else {
        ('[', ']')
    };
    let ranges = &document.selection().ranges;
    for _ in ranges.iter().filter(|r| !r.is_collapsed() && r.end == position) {
        out.push(close);
    }
    for _ in ranges.iter().filter(|r| r.is_collapsed() && r.start == position) {
        out.push(open);
        out.push(close);
    }
    for _ in ranges.iter().filter(|r| !r.is_collapsed() && r.start == position) {
        out.push(open);
    }
}

fn write_children(document: &ViewDocument, parent: ViewNodeId, out: &mut String) {
    let children = document.children(parent);
    for (index, child) in children.iter().enumerate() {
        write_marks(document, ViewPosition::new(parent, index), out);
        write_node(document, *child, out);
    }
    write_marks(document, ViewPosition::new(parent, children.len()), out);
}

fn write_node(document: &ViewDocument, id: ViewNodeId, out: &mut String) {
    let node = &document[id];
    if node.is_text() {
        for (index, ch) in node.data.chars().enumerate() {
            write_marks(document, ViewPosition::new(id, index), out);
            out.push(ch);
        }
        write_marks(document, ViewPosition::new(id, node.max_offset()), out);
        return;
    }

    out.push('<');
    out.push_str(&node.name);
    if !node.classes.is_empty() {
        let classes: Vec<&str> = node.classes.iter().map(String::as_str).collect();
        out.push_str(&format!(" class=\"{}\"", classes.join(" ")));
    }
    if !node.styles.is_empty() {
        let styles: String = node
            .styles
            .iter()
            .map(|(key, value)| format!("{key}:{value};"))
            .collect();
        out.push_str(&format!(" style=\"{styles}\""));
    }
    for (key, value) in &node.attributes {
        out.push_str(&format!(" {key}=\"{value}\""));
    }
    out.push('>');
    write_children(document, id, out);
    out.push_str(&format!("</{}>", node.name));
}
