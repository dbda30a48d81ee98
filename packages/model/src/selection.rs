//! Document selection and the by-value snapshots undo stores.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::Attributes;
use crate::position::{Position, Range};

/// Selection ranges and direction, captured by value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    pub ranges: Vec<Range>,
    pub is_backward: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentSelection {
    ranges: Vec<Range>,
    backward: bool,
    /// Attributes set explicitly since the last range change. When `None`,
    /// attributes are inherited from the surrounding text.
    explicit_attributes: Option<Attributes>,
}

impl DocumentSelection {
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn first_range(&self) -> Option<&Range> {
        self.ranges.iter().min_by(|a, b| a.start.cmp(&b.start))
    }

    pub fn anchor(&self) -> Option<&Position> {
        let range = if self.backward { self.ranges.last() } else { self.ranges.first() };
        range.map(|range| if self.backward { &range.end } else { &range.start })
    }

    pub fn focus(&self) -> Option<&Position> {
        let range = if self.backward { self.ranges.first() } else { self.ranges.last() };
        range.map(|range| if self.backward { &range.start } else { &range.end })
    }

    pub fn is_backward(&self) -> bool {
        self.backward && !self.is_collapsed()
    }

    pub fn is_collapsed(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].is_collapsed()
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            ranges: self.ranges.clone(),
            is_backward: self.is_backward(),
        }
    }

    pub(crate) fn explicit_attributes(&self) -> Option<&Attributes> {
        self.explicit_attributes.as_ref()
    }

    pub(crate) fn set_ranges(&mut self, ranges: Vec<Range>, backward: bool) {
        self.ranges = ranges;
        self.backward = backward;
        self.explicit_attributes = None;
    }

    /// Replaces ranges after the tree changed, keeping explicit attributes.
    pub(crate) fn update_ranges(&mut self, ranges: Vec<Range>) {
        self.ranges = ranges;
    }

    pub(crate) fn set_attribute(&mut self, inherited: Attributes, key: &str, value: Value) {
        self.explicit_attributes
            .get_or_insert(inherited)
            .insert(key.to_string(), value);
    }

    pub(crate) fn remove_attribute(&mut self, inherited: Attributes, key: &str) {
        self.explicit_attributes.get_or_insert(inherited).remove(key);
    }
}
