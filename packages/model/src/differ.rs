//! # Change Differ
//!
//! Records the children of every parent touched by an operation (first
//! snapshot wins) and diffs them against the current tree on demand. The
//! resulting change list uses final-state positions and is ordered by
//! document position, left to right inside each parent.
//!
//! Content of inserted elements is not reported separately: the element's
//! insertion covers it.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{capture_diff_slices, Algorithm, DiffTag};

use crate::node::{Attributes, Element, ElementId, Node, TEXT_NAME};
use crate::position::{Position, Range};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEntry {
    Insert {
        position: Position,
        length: usize,
        name: String,
    },
    Remove {
        position: Position,
        length: usize,
        name: String,
    },
    Attribute {
        range: Range,
        attribute_key: String,
        attribute_old_value: Option<Value>,
        attribute_new_value: Option<Value>,
    },
    /// Synthesized during change reduction; never produced by the differ.
    Reconvert {
        element: ElementId,
        position: Position,
        name: String,
    },
}

impl ChangeEntry {
    /// Position the entry starts at, used to order and filter entries.
    pub fn position(&self) -> &Position {
        match self {
            ChangeEntry::Insert { position, .. }
            | ChangeEntry::Remove { position, .. }
            | ChangeEntry::Reconvert { position, .. } => position,
            ChangeEntry::Attribute { range, .. } => &range.start,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerChange {
    pub name: String,
    pub old_range: Option<Range>,
    pub new_range: Option<Range>,
    /// Content inside the range changed while its boundaries may not have.
    pub content_changed: bool,
}

impl MarkerChange {
    fn is_relevant(&self) -> bool {
        self.old_range != self.new_range || self.content_changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum DiffKey {
    Element(ElementId, String),
    Char(char),
}

#[derive(Debug, Clone)]
struct SnapshotItem {
    key: DiffKey,
    attributes: Attributes,
}

impl SnapshotItem {
    fn is_text(&self) -> bool {
        matches!(self.key, DiffKey::Char(_))
    }

    fn name(&self) -> &str {
        match &self.key {
            DiffKey::Element(_, name) => name,
            DiffKey::Char(_) => TEXT_NAME,
        }
    }
}

fn snapshot_children(parent: &Element) -> Vec<SnapshotItem> {
    let mut items = Vec::with_capacity(parent.max_offset());
    for child in &parent.children {
        match child {
            Node::Element(el) => items.push(SnapshotItem {
                key: DiffKey::Element(el.id, el.name.clone()),
                attributes: el.attributes.clone(),
            }),
            Node::Text(text) => items.extend(text.data.chars().map(|ch| SnapshotItem {
                key: DiffKey::Char(ch),
                attributes: text.attributes.clone(),
            })),
        }
    }
    items
}

/// Read access to the tree the differ compares its snapshots against.
pub trait DiffSource {
    fn element(&self, id: ElementId) -> Option<&Element>;
    /// Root name and offset path of the element's inside. `None` when the
    /// element is detached.
    fn locate(&self, id: ElementId) -> Option<(String, Vec<usize>)>;
    /// Ids of the element's ancestors, outermost first, excluding itself.
    fn ancestor_ids(&self, id: ElementId) -> Vec<ElementId>;
}

#[derive(Debug, Default)]
pub struct Differ {
    snapshots: HashMap<ElementId, Vec<SnapshotItem>>,
    buffer_order: Vec<ElementId>,
    markers: BTreeMap<String, MarkerChange>,
    /// Elements whose view must be rebuilt rather than reused.
    refreshed: HashSet<ElementId>,
}

impl Differ {
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.markers.is_empty() && self.refreshed.is_empty()
    }

    pub(crate) fn buffer_parent(&mut self, parent: &Element) {
        if self.snapshots.contains_key(&parent.id) {
            return;
        }
        self.snapshots.insert(parent.id, snapshot_children(parent));
        self.buffer_order.push(parent.id);
    }

    pub(crate) fn buffer_refresh(&mut self, id: ElementId) {
        self.refreshed.insert(id);
    }

    pub fn is_refreshed(&self, id: ElementId) -> bool {
        self.refreshed.contains(&id)
    }

    pub(crate) fn buffer_marker_change(
        &mut self,
        name: &str,
        old_range: Option<Range>,
        new_range: Option<Range>,
        content_changed: bool,
    ) {
        self.markers
            .entry(name.to_string())
            .and_modify(|change| {
                change.new_range = new_range.clone();
                change.content_changed |= content_changed;
            })
            .or_insert(MarkerChange {
                name: name.to_string(),
                old_range,
                new_range,
                content_changed,
            });
    }

    /// Markers whose range was removed or changed, with their old range.
    pub fn markers_to_remove(&self) -> Vec<(String, Range)> {
        self.markers
            .values()
            .filter(|change| change.is_relevant())
            .filter_map(|change| Some((change.name.clone(), change.old_range.clone()?)))
            .collect()
    }

    /// Markers that were added or changed, with their new range.
    pub fn markers_to_add(&self) -> Vec<(String, Range)> {
        self.markers
            .values()
            .filter(|change| change.is_relevant())
            .filter_map(|change| Some((change.name.clone(), change.new_range.clone()?)))
            .collect()
    }

    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.buffer_order.clear();
        self.markers.clear();
        self.refreshed.clear();
    }

    pub fn changes<S: DiffSource>(&self, source: &S) -> Vec<ChangeEntry> {
        let mut per_parent: Vec<(ElementId, Position, Vec<ChangeEntry>)> = Vec::new();
        let mut inserted: HashSet<ElementId> = HashSet::new();

        for parent_id in &self.buffer_order {
            let Some(parent) = source.element(*parent_id) else {
                continue;
            };
            let Some((root, path)) = source.locate(*parent_id) else {
                continue;
            };
            let inside = Position {
                root,
                path: path.into_iter().chain(std::iter::once(0)).collect(),
            };
            if inside.is_in_graveyard() {
                continue;
            }
            let old = &self.snapshots[parent_id];
            let new = snapshot_children(parent);
            let entries = diff_children(old, &new, &inside, &mut inserted);
            if !entries.is_empty() {
                per_parent.push((*parent_id, inside, entries));
            }
        }

        per_parent.retain(|(parent_id, _, _)| {
            !inserted.contains(parent_id)
                && !source
                    .ancestor_ids(*parent_id)
                    .iter()
                    .any(|id| inserted.contains(id))
        });

        let mut changes: Vec<ChangeEntry> = Vec::new();
        for (_, _, entries) in per_parent {
            changes.extend(entries);
        }
        // Stable: entries at one position keep their left-to-right order.
        changes.sort_by(|a, b| a.position().cmp(b.position()));
        changes
    }
}

fn diff_children(
    old: &[SnapshotItem],
    new: &[SnapshotItem],
    inside: &Position,
    inserted: &mut HashSet<ElementId>,
) -> Vec<ChangeEntry> {
    let old_keys: Vec<&DiffKey> = old.iter().map(|item| &item.key).collect();
    let new_keys: Vec<&DiffKey> = new.iter().map(|item| &item.key).collect();
    let mut entries = Vec::new();

    for op in capture_diff_slices(Algorithm::Myers, &old_keys, &new_keys) {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                let pairs = old[old_range].iter().zip(&new[new_range.clone()]);
                entries.extend(attribute_changes(pairs, new_range.start, inside));
            }
            DiffTag::Delete => {
                entries.extend(grouped(&old[old_range], new_range.start, inside, false));
            }
            DiffTag::Insert => {
                mark_inserted(&new[new_range.clone()], inserted);
                entries.extend(grouped(&new[new_range.clone()], new_range.start, inside, true));
            }
            DiffTag::Replace => {
                entries.extend(grouped(&old[old_range], new_range.start, inside, false));
                mark_inserted(&new[new_range.clone()], inserted);
                entries.extend(grouped(&new[new_range.clone()], new_range.start, inside, true));
            }
        }
    }
    entries
}

fn mark_inserted(items: &[SnapshotItem], inserted: &mut HashSet<ElementId>) {
    for item in items {
        if let DiffKey::Element(id, _) = item.key {
            inserted.insert(id);
        }
    }
}

/// Insert/remove entries for a run of items at `offset`: text runs become one
/// entry, every element gets its own.
fn grouped(items: &[SnapshotItem], offset: usize, inside: &Position, insert: bool) -> Vec<ChangeEntry> {
    let mut entries = Vec::new();
    let mut index = 0;
    while index < items.len() {
        let mut length = 1;
        if items[index].is_text() {
            while index + length < items.len() && items[index + length].is_text() {
                length += 1;
            }
        }
        let name = items[index].name().to_string();
        // Removed items do not occupy offsets in the final state.
        let at = if insert { offset + index } else { offset };
        let position = inside.with_offset(at);
        entries.push(if insert {
            ChangeEntry::Insert { position, length, name }
        } else {
            ChangeEntry::Remove { position, length, name }
        });
        index += length;
    }
    entries
}

fn attribute_changes<'a>(
    pairs: impl Iterator<Item = (&'a SnapshotItem, &'a SnapshotItem)>,
    start: usize,
    inside: &Position,
) -> Vec<ChangeEntry> {
    // key -> open run (start offset, end offset, old value, new value)
    let mut open: BTreeMap<String, (usize, usize, Option<Value>, Option<Value>)> = BTreeMap::new();
    let mut closed: Vec<(usize, String, usize, Option<Value>, Option<Value>)> = Vec::new();

    for (index, (old, new)) in pairs.enumerate() {
        let offset = start + index;
        let keys: Vec<&String> = old.attributes.keys().chain(new.attributes.keys()).collect();
        let mut changed: BTreeMap<String, (Option<Value>, Option<Value>)> = BTreeMap::new();
        for key in keys {
            let before = old.attributes.get(key).cloned();
            let after = new.attributes.get(key).cloned();
            if before != after {
                changed.insert(key.clone(), (before, after));
            }
        }

        let open_keys: Vec<String> = open.keys().cloned().collect();
        for key in open_keys {
            let continues = changed.get(&key).is_some_and(|(before, after)| {
                let run = &open[&key];
                run.1 == offset && &run.2 == before && &run.3 == after
            });
            if continues {
                if let Some(run) = open.get_mut(&key) {
                    run.1 = offset + 1;
                }
                changed.remove(&key);
            } else if let Some((run_start, run_end, before, after)) = open.remove(&key) {
                closed.push((run_start, key, run_end, before, after));
            }
        }
        for (key, (before, after)) in changed {
            if let Some((run_start, run_end, old_before, old_after)) = open.remove(&key) {
                closed.push((run_start, key.clone(), run_end, old_before, old_after));
            }
            open.insert(key, (offset, offset + 1, before, after));
        }
    }
    for (key, (run_start, run_end, before, after)) in open {
        closed.push((run_start, key, run_end, before, after));
    }
    closed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    closed
        .into_iter()
        .map(|(run_start, key, run_end, before, after)| ChangeEntry::Attribute {
            range: Range::new(inside.with_offset(run_start), inside.with_offset(run_end)),
            attribute_key: key,
            attribute_old_value: before,
            attribute_new_value: after,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(parent: &Element) -> Vec<SnapshotItem> {
        snapshot_children(parent)
    }

    fn inside() -> Position {
        Position::new("main", vec![0, 0])
    }

    #[test]
    fn test_text_insert_is_one_entry() {
        let old = Element::new(ElementId(1), "paragraph").with_children(vec![Node::text("fr")]);
        let new = Element::new(ElementId(1), "paragraph").with_children(vec![Node::text("foobar")]);
        let mut inserted = HashSet::new();
        let entries = diff_children(&items(&old), &items(&new), &inside(), &mut inserted);
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            ChangeEntry::Insert { length, name, .. } => {
                assert_eq!(*length, 4);
                assert_eq!(name, TEXT_NAME);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_attribute_runs_are_merged() {
        let old = Element::new(ElementId(1), "paragraph").with_children(vec![Node::text("foobar")]);
        let new = Element::new(ElementId(1), "paragraph").with_children(vec![
            Node::text("fo"),
            Node::Text(crate::node::Text::new("ob").with_attribute("bold", json!(true))),
            Node::text("ar"),
        ]);
        let mut inserted = HashSet::new();
        let entries = diff_children(&items(&old), &items(&new), &inside(), &mut inserted);
        assert_eq!(
            entries,
            vec![ChangeEntry::Attribute {
                range: Range::new(
                    Position::new("main", vec![0, 2]),
                    Position::new("main", vec![0, 4])
                ),
                attribute_key: "bold".into(),
                attribute_old_value: None,
                attribute_new_value: Some(json!(true)),
            }]
        );
    }

    #[test]
    fn test_rename_is_remove_then_insert() {
        let old = Element::new(ElementId(1), "root").with_children(vec![Node::Element(Element::new(
            ElementId(2),
            "paragraph",
        ))]);
        let new = Element::new(ElementId(1), "root").with_children(vec![Node::Element(Element::new(
            ElementId(2),
            "heading2",
        ))]);
        let mut inserted = HashSet::new();
        let entries = diff_children(&items(&old), &items(&new), &inside(), &mut inserted);
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0], ChangeEntry::Remove { name, .. } if name == "paragraph"));
        assert!(matches!(&entries[1], ChangeEntry::Insert { name, .. } if name == "heading2"));
        assert!(inserted.contains(&ElementId(2)));
    }
}
