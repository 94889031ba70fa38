//! Element queries: by tag, class, text; generic predicate matching.

use super::node::{ElementData, ElementId};
use super::tree::ElementTree;

impl ElementTree {
    /// Find all elements whose tag matches the given string.
    pub fn query_by_tag(&self, tag: &str) -> Vec<ElementId> {
        self.query_all(|data| data.tag == tag)
    }

    /// Find all elements that have the given class.
    pub fn query_by_class(&self, class: &str) -> Vec<ElementId> {
        self.query_all(|data| data.has_class(class))
    }

    /// Find all elements whose text contains `needle`.
    pub fn query_by_text(&self, needle: &str) -> Vec<ElementId> {
        self.query_all(|data| data.text.contains(needle))
    }

    /// Find all elements matching an arbitrary predicate, in id order.
    pub fn query_all(&self, predicate: impl Fn(&ElementData) -> bool) -> Vec<ElementId> {
        self.iter()
            .filter(|(_, data)| predicate(data))
            .map(|(id, _)| id)
            .collect()
    }
}
