//! Named ranges that live alongside the tree and move with it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::position::{Position, Range};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub name: String,
    pub range: Range,
    /// Marker changes that affect data are part of the document content
    /// (and of undo history).
    pub affects_data: bool,
}

/// Markers keyed by name, iterated in name order.
#[derive(Debug, Default, Clone)]
pub struct Markers {
    markers: BTreeMap<String, Marker>,
}

impl Markers {
    pub fn get(&self, name: &str) -> Option<&Marker> {
        self.markers.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.markers.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    /// Markers whose range strictly contains `position`.
    pub fn markers_at_position<'a>(
        &'a self,
        position: &'a Position,
    ) -> impl Iterator<Item = &'a Marker> + 'a {
        self.markers
            .values()
            .filter(move |marker| marker.range.contains_position(position))
    }

    /// Markers whose range starts with `prefix:` (marker groups).
    pub fn group<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Marker> + 'a {
        self.markers
            .values()
            .filter(move |marker| marker.name.strip_prefix(prefix).is_some_and(|rest| rest.starts_with(':')))
    }

    /// Returns the previous range, if any.
    pub(crate) fn set(&mut self, name: &str, range: Range, affects_data: bool) -> Option<Range> {
        self.markers
            .insert(
                name.to_string(),
                Marker {
                    name: name.to_string(),
                    range,
                    affects_data,
                },
            )
            .map(|previous| previous.range)
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Marker> {
        self.markers.remove(name)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Marker> {
        self.markers.values_mut()
    }
}
