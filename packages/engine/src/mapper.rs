//! # Mapper
//!
//! Bindings between model elements and view elements, position translation in
//! both directions, and the marker-name bindings of view elements created by
//! marker converters.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use scribe_model::{DiffSource, Document, ElementId, Position, Range};
use scribe_view::{ViewDocument, ViewNodeId, ViewPosition, ViewRange};
use tracing::trace;

use crate::error::{ConversionError, ConversionResult};

#[derive(Debug, Default)]
pub struct Mapper {
    model_to_view: HashMap<ElementId, ViewNodeId>,
    view_to_model: HashMap<ViewNodeId, ElementId>,
    /// View element and the root it was under when unbinding was deferred.
    deferred_unbindings: Vec<(ViewNodeId, ViewNodeId)>,
    marker_to_elements: BTreeMap<String, BTreeSet<ViewNodeId>>,
    element_to_markers: HashMap<ViewNodeId, BTreeSet<String>>,
    unbound_marker_names: BTreeSet<String>,
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_elements(&mut self, model: ElementId, view: ViewNodeId) {
        self.model_to_view.insert(model, view);
        self.view_to_model.insert(view, model);
    }

    /// Unbinds a view element. A deferred unbinding only happens on
    /// [`Mapper::flush_deferred_bindings`], and only if the element has not
    /// been re-attached under a different root in the meantime.
    pub fn unbind_view_element(&mut self, view: ViewNodeId, defer: bool, view_document: &ViewDocument) {
        if let Some(names) = self.element_to_markers.get(&view) {
            self.unbound_marker_names.extend(names.iter().cloned());
        }
        if defer {
            self.deferred_unbindings.push((view, view_document.top_most(view)));
            return;
        }
        if let Some(model) = self.view_to_model.remove(&view) {
            if self.model_to_view.get(&model) == Some(&view) {
                self.model_to_view.remove(&model);
            }
        }
    }

    pub fn unbind_model_element(&mut self, model: ElementId) {
        if let Some(view) = self.model_to_view.remove(&model) {
            if self.view_to_model.get(&view) == Some(&model) {
                self.view_to_model.remove(&view);
            }
        }
    }

    pub fn flush_deferred_bindings(&mut self, view_document: &ViewDocument) {
        for (view, root) in std::mem::take(&mut self.deferred_unbindings) {
            if view_document.top_most(view) == root {
                self.unbind_view_element(view, false, view_document);
            }
        }
    }

    pub fn to_view_element(&self, model: ElementId) -> Option<ViewNodeId> {
        self.model_to_view.get(&model).copied()
    }

    pub fn to_model_element(&self, view: ViewNodeId) -> Option<ElementId> {
        self.view_to_model.get(&view).copied()
    }

    /// How many model offsets a view node stands for.
    pub fn model_length(&self, view_document: &ViewDocument, node: ViewNodeId) -> usize {
        let view_node = &view_document[node];
        if self.view_to_model.contains_key(&node) {
            1
        } else if view_node.is_text() {
            view_node.max_offset()
        } else if view_node.is_ui() {
            0
        } else {
            view_node
                .children
                .iter()
                .map(|child| self.model_length(view_document, *child))
                .sum()
        }
    }

    /// Finds the view position matching `expected` model offset inside `parent`,
    /// descending into unbound elements and preferring text positions.
    pub fn find_position_in(
        &self,
        view_document: &ViewDocument,
        parent: ViewNodeId,
        expected: usize,
    ) -> Option<ViewPosition> {
        if view_document[parent].is_text() {
            return Some(ViewPosition::new(parent, expected));
        }
        let children = view_document.children(parent);
        let (mut model_offset, mut view_offset) = (0, 0);
        let mut last = None;
        while model_offset < expected {
            let child = *children.get(view_offset)?;
            model_offset += self.model_length(view_document, child);
            view_offset += 1;
            last = Some(child);
        }
        if model_offset == expected {
            return Some(view_document.position_in_text(ViewPosition::new(parent, view_offset)));
        }
        let child = last?;
        let overshoot = model_offset - expected;
        let length = self.model_length(view_document, child);
        self.find_position_in(view_document, child, length - overshoot)
    }

    pub fn to_view_position(
        &self,
        document: &Document,
        view_document: &ViewDocument,
        position: &Position,
    ) -> ConversionResult<ViewPosition> {
        let unmapped = || ConversionError::UnmappedPosition(format!("{position:?}"));
        let parent = document.parent_of(position).map_err(|_| unmapped())?;
        let view_parent = self.to_view_element(parent.id).ok_or_else(unmapped)?;
        self.find_position_in(view_document, view_parent, position.offset())
            .ok_or_else(unmapped)
    }

    pub fn to_view_range(
        &self,
        document: &Document,
        view_document: &ViewDocument,
        range: &Range,
    ) -> ConversionResult<ViewRange> {
        Ok(ViewRange::new(
            self.to_view_position(document, view_document, &range.start)?,
            self.to_view_position(document, view_document, &range.end)?,
        ))
    }

    fn model_offset_of(
        &self,
        view_document: &ViewDocument,
        parent: ViewNodeId,
        offset: usize,
        block: ViewNodeId,
    ) -> Option<usize> {
        if parent != block {
            let grand_parent = view_document.parent(parent)?;
            let index = view_document.index_in_parent(parent)?;
            let before = self.model_offset_of(view_document, grand_parent, index, block)?;
            let inside = self.model_offset_of(view_document, parent, offset, parent)?;
            return Some(before + inside);
        }
        if view_document[parent].is_text() {
            return Some(offset);
        }
        Some(
            view_document.children(parent)[..offset.min(view_document.children(parent).len())]
                .iter()
                .map(|child| self.model_length(view_document, *child))
                .sum(),
        )
    }

    pub fn to_model_position(
        &self,
        document: &Document,
        view_document: &ViewDocument,
        position: ViewPosition,
    ) -> Option<Position> {
        let block = std::iter::once(position.parent)
            .chain(view_document.ancestors(position.parent))
            .find(|node| self.view_to_model.contains_key(node))?;
        let model = self.to_model_element(block)?;
        let (root, mut path) = document.locate(model)?;
        path.push(self.model_offset_of(view_document, position.parent, position.offset, block)?);
        Some(Position::new(root, path))
    }

    pub fn bind_element_to_marker(&mut self, view: ViewNodeId, name: &str) {
        self.marker_to_elements
            .entry(name.to_string())
            .or_default()
            .insert(view);
        self.element_to_markers
            .entry(view)
            .or_default()
            .insert(name.to_string());
    }

    pub fn unbind_element_from_marker_name(&mut self, view: ViewNodeId, name: &str) {
        if let Some(elements) = self.marker_to_elements.get_mut(name) {
            elements.remove(&view);
            if elements.is_empty() {
                self.marker_to_elements.remove(name);
            }
        }
        if let Some(names) = self.element_to_markers.get_mut(&view) {
            names.remove(name);
            if names.is_empty() {
                self.element_to_markers.remove(&view);
            }
        }
    }

    pub fn marker_name_to_elements(&self, name: &str) -> Option<Vec<ViewNodeId>> {
        self.marker_to_elements
            .get(name)
            .map(|elements| elements.iter().copied().collect())
    }

    /// Names of markers whose view elements were unbound since the last flush.
    pub fn flush_unbound_marker_names(&mut self) -> Vec<String> {
        let names: Vec<String> = std::mem::take(&mut self.unbound_marker_names).into_iter().collect();
        if !names.is_empty() {
            trace!(?names, "Flushing unbound marker names");
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_model::{Model, Node, Text};
    use scribe_view::DowncastWriter;

    /// `<paragraph>foo<$text bold>bar</$text></paragraph>` rendered as
    /// `<p>foo<strong>bar</strong></p>`.
    fn fixture() -> (Model, ViewDocument, Mapper, ViewNodeId, ViewNodeId) {
        let mut model = Model::new(&["main"]);
        model
            .change(Default::default(), |writer| {
                let mut paragraph = writer.create_element("paragraph");
                paragraph.children = vec![
                    Node::text("foo"),
                    Node::Text(Text::new("bar").with_attribute("bold", true)),
                ];
                writer.insert(&Position::new("main", vec![0]), vec![Node::Element(paragraph)])
            })
            .unwrap();
        let mut view = ViewDocument::new();
        let root = view.create_root("main", "div");
        let mut writer = DowncastWriter::new(&mut view);
        let p = writer.create_container_element("p", &[]);
        let foo = writer.create_text("foo");
        let strong = writer.create_attribute_element("strong", &[], 10, None);
        let bar = writer.create_text("bar");
        writer.append_child(strong, bar);
        writer.append_child(p, foo);
        writer.append_child(p, strong);
        writer.insert(ViewPosition::new(root, 0), &[p]).unwrap();

        let mut mapper = Mapper::new();
        let document = model.document();
        mapper.bind_elements(document.root("main").unwrap().id, root);
        let paragraph = document.element_at("main", &[0]).unwrap().id;
        mapper.bind_elements(paragraph, p);
        (model, view, mapper, p, bar)
    }

    #[test]
    fn test_model_lengths() {
        let (_, view, mapper, p, _) = fixture();
        assert_eq!(mapper.model_length(&view, p), 1);
        let strong = view.children(p)[1];
        assert_eq!(mapper.model_length(&view, strong), 3);
    }

    #[test]
    fn test_positions_map_into_attribute_elements() {
        let (model, view, mapper, p, bar) = fixture();
        let document = model.document();

        let inside_bold = mapper
            .to_view_position(document, &view, &Position::new("main", vec![0, 4]))
            .unwrap();
        assert_eq!(inside_bold, ViewPosition::new(bar, 1));

        let boundary = mapper
            .to_view_position(document, &view, &Position::new("main", vec![0, 3]))
            .unwrap();
        let foo = view.children(p)[0];
        assert_eq!(boundary, ViewPosition::new(foo, 3));

        let back = mapper.to_model_position(document, &view, inside_bold).unwrap();
        assert_eq!(back, Position::new("main", vec![0, 4]));
    }

    #[test]
    fn test_deferred_unbinding_skips_reattached_elements() {
        let (model, mut view, mut mapper, p, _) = fixture();
        let paragraph = model.document().element_at("main", &[0]).unwrap().id;

        let root = view.root("main").unwrap();
        let range = ViewRange::new(ViewPosition::new(root, 0), ViewPosition::new(root, 1));
        DowncastWriter::new(&mut view).remove(range).unwrap();
        mapper.unbind_view_element(p, true, &view);
        DowncastWriter::new(&mut view)
            .insert(ViewPosition::new(root, 0), &[p])
            .unwrap();

        mapper.flush_deferred_bindings(&view);
        assert_eq!(mapper.to_view_element(paragraph), Some(p));

        let range = ViewRange::new(ViewPosition::new(root, 0), ViewPosition::new(root, 1));
        DowncastWriter::new(&mut view).remove(range).unwrap();
        mapper.unbind_view_element(p, true, &view);
        mapper.flush_deferred_bindings(&view);
        assert_eq!(mapper.to_view_element(paragraph), None);
    }

    #[test]
    fn test_unbinding_marks_marker_names() {
        let (_, view, mut mapper, p, _) = fixture();
        mapper.bind_element_to_marker(p, "comment:1");
        mapper.unbind_view_element(p, false, &view);
        assert_eq!(mapper.flush_unbound_marker_names(), vec!["comment:1".to_string()]);
        assert!(mapper.flush_unbound_marker_names().is_empty());
        assert_eq!(mapper.to_model_element(p), None);
    }
}
