//! Node types: ElementId, SlotRef, Slot, ElementData.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::listener::EventListener;

/// Name of the slot every element owns.
pub const DEFAULT_SLOT: &str = "default";

/// Identifier of an element, unique within its client. Copy, lightweight (u64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-owning reference to a named slot of an element.
///
/// Elements point at their parent through a `SlotRef`, so the tree never
/// holds a counted back-reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotRef {
    /// The element owning the slot.
    pub element: ElementId,
    /// The slot name, unique within `element`.
    pub name: String,
}

impl SlotRef {
    /// Reference the default slot of `element`.
    pub fn default_of(element: ElementId) -> Self {
        Self::new(element, DEFAULT_SLOT)
    }

    /// Reference the slot `name` of `element`.
    pub fn new(element: ElementId, name: impl Into<String>) -> Self {
        Self {
            element,
            name: name.into(),
        }
    }
}

/// An ordered child container owned by one element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    /// Child elements in display order.
    pub children: Vec<ElementId>,
}

/// Callback run when an element is torn down.
#[derive(Clone)]
pub struct TeardownHook(pub Rc<dyn Fn(ElementId)>);

impl fmt::Debug for TeardownHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TeardownHook(<fn>)")
    }
}

/// Data associated with a single element.
#[derive(Debug, Clone)]
pub struct ElementData {
    /// Tag/kind discriminator (e.g. `div`, `q-card`).
    pub tag: String,
    /// Class names, set-like with insertion order preserved.
    pub classes: Vec<String>,
    /// Inline style declarations.
    pub style: IndexMap<String, String>,
    /// Props; a flag prop has the value `true`.
    pub props: IndexMap<String, Value>,
    /// Literal text content.
    pub text: String,
    /// Named slots; `default` is always present and first.
    pub slots: IndexMap<String, Slot>,
    /// Registered event listeners.
    pub listeners: Vec<EventListener>,
    /// The slot this element is attached to, if any.
    pub parent: Option<SlotRef>,
    pub(crate) teardown: Vec<TeardownHook>,
}

impl ElementData {
    /// Create element data with the given tag and an empty default slot.
    pub fn new(tag: impl Into<String>) -> Self {
        let mut slots = IndexMap::new();
        slots.insert(DEFAULT_SLOT.to_owned(), Slot::default());
        Self {
            tag: tag.into(),
            classes: Vec::new(),
            style: IndexMap::new(),
            props: IndexMap::new(),
            text: String::new(),
            slots,
            listeners: Vec::new(),
            parent: None,
            teardown: Vec::new(),
        }
    }

    /// Check whether this element has a given class.
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// All direct children across slots, in slot order then child order.
    pub fn children(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.slots.values().flat_map(|slot| slot.children.iter().copied())
    }

    /// Slot name → child id list, as sent to the browser.
    pub fn slot_map(&self) -> IndexMap<String, Vec<ElementId>> {
        self.slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.children.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults() {
        let data = ElementData::new("div");
        assert_eq!(data.tag, "div");
        assert!(data.classes.is_empty());
        assert!(data.style.is_empty());
        assert!(data.props.is_empty());
        assert!(data.text.is_empty());
        assert!(data.parent.is_none());
        assert_eq!(data.slots.len(), 1);
        assert!(data.slots.contains_key(DEFAULT_SLOT));
    }

    #[test]
    fn has_class() {
        let mut data = ElementData::new("X");
        data.classes.push("active".into());
        assert!(data.has_class("active"));
        assert!(!data.has_class("inactive"));
    }

    #[test]
    fn children_across_slots() {
        let mut data = ElementData::new("q-card");
        data.slots.insert("header".into(), Slot::default());
        data.slots[DEFAULT_SLOT].children.push(ElementId(2));
        data.slots["header"].children.push(ElementId(5));
        data.slots["header"].children.push(ElementId(7));
        let all: Vec<_> = data.children().collect();
        assert_eq!(all, vec![ElementId(2), ElementId(5), ElementId(7)]);
    }

    #[test]
    fn slot_ref_default() {
        let slot = SlotRef::default_of(ElementId(3));
        assert_eq!(slot.element, ElementId(3));
        assert_eq!(slot.name, "default");
    }

    #[test]
    fn element_id_is_copy_and_displays() {
        fn assert_copy<T: Copy>() {}
        assert_copy::<ElementId>();
        assert_eq!(ElementId(42).to_string(), "42");
    }
}
