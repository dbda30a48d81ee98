//! Text rendering of a model root, used by tests.
//!
//! Elements render as `<name key="value">...</name>`, text with attributes as
//! `<$text key="value">...</$text>`. Selection boundaries render as `[` and
//! `]` (`[]` when collapsed).

use serde_json::Value;

use crate::document::Document;
use crate::node::{Attributes, Element, Node};
use crate::position::Position;

pub fn stringify(document: &Document, root: &str) -> String {
    let Ok(element) = document.root(root) else {
        return String::new();
    };
    let mut boundaries: Vec<(Position, &'static str)> = Vec::new();
    for range in document.selection().ranges() {
        if range.root() != root {
            continue;
        }
        if range.is_collapsed() {
            boundaries.push((range.start.clone(), "[]"));
        } else {
            boundaries.push((range.start.clone(), "["));
            boundaries.push((range.end.clone(), "]"));
        }
    }
    let mut out = String::new();
    write_children(element, &Position::new(root, vec![0]), &boundaries, &mut out);
    out
}

fn format_attributes(attributes: &Attributes) -> String {
    attributes
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!(" {key}=\"{value}\"")
        })
        .collect()
}

fn write_boundaries(at: &Position, boundaries: &[(Position, &str)], out: &mut String) {
    for (position, mark) in boundaries {
        if position == at {
            out.push_str(mark);
        }
    }
}

fn write_children(parent: &Element, inside: &Position, boundaries: &[(Position, &str)], out: &mut String) {
    let mut offset = 0;
    for child in &parent.children {
        match child {
            Node::Element(element) => {
                write_boundaries(&inside.with_offset(offset), boundaries, out);
                out.push_str(&format!("<{}{}>", element.name, format_attributes(&element.attributes)));
                write_children(element, &inside.with_offset(offset).child(0), boundaries, out);
                out.push_str(&format!("</{}>", element.name));
                offset += 1;
            }
            Node::Text(text) => {
                let wrapped = !text.attributes.is_empty();
                write_boundaries(&inside.with_offset(offset), boundaries, out);
                if wrapped {
                    out.push_str(&format!("<$text{}>", format_attributes(&text.attributes)));
                }
                for (index, ch) in text.data.chars().enumerate() {
                    if index > 0 {
                        write_boundaries(&inside.with_offset(offset + index), boundaries, out);
                    }
                    out.push(ch);
                }
                offset += text.len();
                if wrapped {
                    out.push_str("</$text>");
                }
            }
        }
    }
    write_boundaries(&inside.with_offset(offset), boundaries, out);
}
