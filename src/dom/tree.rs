//! Element registry and tree operations: create, mutate, clear, remove, walk.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::node::{ElementData, ElementId, Slot, SlotRef};
use crate::css::{self, Change};
use crate::error::{Error, Result};
use crate::event::listener::{self, EventListener, ListenerSummary};

/// Keys accepted by [`ElementTree::serialize`], in wire order.
pub const SERIAL_KEYS: &[&str] = &[
    "id", "tag", "class", "style", "props", "text", "slots", "events",
];

/// Which child to remove in [`ElementTree::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveTarget {
    /// A direct or indirect descendant, by identity.
    Element(ElementId),
    /// Position among all direct children across slots.
    Index(usize),
}

impl From<ElementId> for RemoveTarget {
    fn from(id: ElementId) -> Self {
        Self::Element(id)
    }
}

impl From<usize> for RemoveTarget {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// The identity registry and element tree of one client.
///
/// Elements are stored by id; parent links are non-owning [`SlotRef`]s and
/// child lists live in the parent's slots, so removal is O(subtree size) and
/// lookup is O(1). Ids are allocated from a monotonic counter and never reused.
#[derive(Debug, Default)]
pub struct ElementTree {
    elements: HashMap<ElementId, ElementData>,
    next_id: u64,
}

impl ElementTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new element, attaching it to `parent` if given.
    ///
    /// Fails if the parent slot does not exist; nothing is registered then.
    pub fn create(&mut self, tag: impl Into<String>, parent: Option<SlotRef>) -> Result<ElementId> {
        if let Some(slot) = &parent {
            self.slot(slot)?;
        }
        let id = ElementId(self.next_id);
        self.next_id += 1;

        let mut data = ElementData::new(tag);
        if let Some(slot) = &parent {
            self.slot_mut(slot)?.children.push(id);
        }
        data.parent = parent;
        self.elements.insert(id, data);
        Ok(id)
    }

    /// Add an empty named slot. Returns `false` if it already existed.
    pub fn add_slot(&mut self, id: ElementId, name: &str) -> Result<bool> {
        let data = self.get_mut(id)?;
        if data.slots.contains_key(name) {
            return Ok(false);
        }
        data.slots.insert(name.to_owned(), Slot::default());
        Ok(true)
    }

    fn slot(&self, slot: &SlotRef) -> Result<&Slot> {
        self.get(slot.element)?
            .slots
            .get(&slot.name)
            .ok_or_else(|| Error::SlotNotFound {
                element: slot.element,
                name: slot.name.clone(),
            })
    }

    fn slot_mut(&mut self, slot: &SlotRef) -> Result<&mut Slot> {
        self.get_mut(slot.element)?
            .slots
            .get_mut(&slot.name)
            .ok_or_else(|| Error::SlotNotFound {
                element: slot.element,
                name: slot.name.clone(),
            })
    }

    // ── Lookup ───────────────────────────────────────────────────────

    /// Immutable access to an element's data.
    pub fn get(&self, id: ElementId) -> Result<&ElementData> {
        self.elements.get(&id).ok_or(Error::ElementNotFound(id))
    }

    /// Mutable access to an element's data.
    pub fn get_mut(&mut self, id: ElementId) -> Result<&mut ElementData> {
        self.elements.get_mut(&id).ok_or(Error::ElementNotFound(id))
    }

    /// Whether the tree contains an element with the given id.
    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    /// Number of registered elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether no element is registered.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterate over all `(ElementId, &ElementData)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &ElementData)> {
        let mut ids: Vec<_> = self.elements.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(move |id| (id, &self.elements[&id]))
    }

    /// The element owning the slot `id` is attached to.
    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.elements.get(&id)?.parent.as_ref().map(|slot| slot.element)
    }

    /// Walk from `id` up to the root, collecting ancestor ids (nearest first).
    pub fn ancestors(&self, id: ElementId) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut current = id;
        while let Some(p) = self.parent(current) {
            result.push(p);
            current = p;
        }
        result
    }

    /// The topmost ancestor of `id`, or `id` itself if it has no parent.
    pub fn top_of(&self, id: ElementId) -> Option<ElementId> {
        if !self.contains(id) {
            return None;
        }
        Some(self.ancestors(id).last().copied().unwrap_or(id))
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Apply a class change. Returns whether the class list changed.
    pub fn modify_classes(&mut self, id: ElementId, change: &Change<'_>) -> Result<bool> {
        let data = self.get_mut(id)?;
        let classes = css::apply_classes(&data.classes, change)?;
        if classes == data.classes {
            return Ok(false);
        }
        data.classes = classes;
        Ok(true)
    }

    /// Apply a style change. Returns whether the style map changed.
    pub fn modify_style(&mut self, id: ElementId, change: &Change<'_>) -> Result<bool> {
        let data = self.get_mut(id)?;
        let style = css::apply_style(&data.style, change)?;
        if style == data.style {
            return Ok(false);
        }
        data.style = style;
        Ok(true)
    }

    /// Apply a prop change. Returns whether the prop map changed.
    pub fn modify_props(&mut self, id: ElementId, change: &Change<'_>) -> Result<bool> {
        let data = self.get_mut(id)?;
        let props = css::apply_props(&data.props, change)?;
        if props == data.props {
            return Ok(false);
        }
        data.props = props;
        Ok(true)
    }

    /// Set a single prop to an arbitrary JSON value. Returns whether it changed.
    pub fn set_prop(&mut self, id: ElementId, key: &str, value: Value) -> Result<bool> {
        let data = self.get_mut(id)?;
        if data.props.get(key) == Some(&value) {
            return Ok(false);
        }
        data.props.insert(key.to_owned(), value);
        Ok(true)
    }

    /// Replace the text content. Returns whether it changed.
    pub fn set_text(&mut self, id: ElementId, text: &str) -> Result<bool> {
        let data = self.get_mut(id)?;
        if data.text == text {
            return Ok(false);
        }
        data.text = text.to_owned();
        Ok(true)
    }

    /// Register an event listener.
    pub fn add_listener(&mut self, id: ElementId, listener: EventListener) -> Result<()> {
        self.get_mut(id)?.listeners.push(listener);
        Ok(())
    }

    /// Listeners whose type string equals `ty` exactly.
    pub fn listeners_for(&self, id: ElementId, ty: &str) -> Result<Vec<EventListener>> {
        Ok(self
            .get(id)?
            .listeners
            .iter()
            .filter(|listener| listener.ty == ty)
            .cloned()
            .collect())
    }

    /// Merged listener advertisement for one base event.
    pub fn listener_summary(&self, id: ElementId, base: &str) -> Result<Option<ListenerSummary>> {
        Ok(listener::summarize(&self.get(id)?.listeners, base))
    }

    // ── Structure ────────────────────────────────────────────────────

    /// The element's own id followed by a depth-first walk of its descendants.
    pub fn collect_descendant_ids(&self, id: ElementId) -> Result<Vec<ElementId>> {
        self.get(id)?;
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(data) = self.elements.get(&current) else {
                continue;
            };
            result.push(current);
            // Push children in reverse so the first child is visited first.
            let kids: Vec<_> = data.children().collect();
            stack.extend(kids.into_iter().rev());
        }
        Ok(result)
    }

    /// Remove every descendant of `id`, keeping `id` itself.
    ///
    /// Returns the removed elements' data in depth-first order.
    pub fn clear(&mut self, id: ElementId) -> Result<Vec<(ElementId, ElementData)>> {
        let descendants = self.collect_descendant_ids(id)?;
        for slot in self.get_mut(id)?.slots.values_mut() {
            slot.children.clear();
        }
        Ok(self.unregister(&descendants[1..]))
    }

    /// Remove one descendant of `id` (and its subtree).
    ///
    /// Returns the element whose child list changed together with the removed
    /// elements' data.
    pub fn remove(
        &mut self,
        id: ElementId,
        target: RemoveTarget,
    ) -> Result<(ElementId, Vec<(ElementId, ElementData)>)> {
        let child = match target {
            RemoveTarget::Index(index) => {
                let children: Vec<_> = self.get(id)?.children().collect();
                *children.get(index).ok_or(Error::ChildIndexOutOfRange {
                    index,
                    len: children.len(),
                })?
            }
            RemoveTarget::Element(child) => {
                self.get(id)?;
                self.get(child)?;
                if !self.ancestors(child).contains(&id) {
                    return Err(Error::NotADescendant { parent: id, child });
                }
                child
            }
        };
        let parent = self.parent(child).unwrap_or(id);
        let removed = self.delete_subtree(child)?;
        Ok((parent, removed))
    }

    /// Detach `id` from its parent and unregister it with all descendants.
    pub fn delete_subtree(&mut self, id: ElementId) -> Result<Vec<(ElementId, ElementData)>> {
        let ids = self.collect_descendant_ids(id)?;
        self.detach(id);
        Ok(self.unregister(&ids))
    }

    /// Move `id` (with its subtree) to the end of `target`.
    pub fn move_to(&mut self, id: ElementId, target: SlotRef) -> Result<()> {
        self.get(id)?;
        self.slot(&target)?;
        if target.element == id || self.ancestors(target.element).contains(&id) {
            return Err(Error::NotADescendant {
                parent: id,
                child: target.element,
            });
        }
        self.detach(id);
        self.slot_mut(&target)?.children.push(id);
        self.get_mut(id)?.parent = Some(target);
        Ok(())
    }

    /// Remove `id` from its parent's child list.
    fn detach(&mut self, id: ElementId) {
        let Some(parent) = self.elements.get_mut(&id).and_then(|d| d.parent.take()) else {
            return;
        };
        if let Ok(slot) = self.slot_mut(&parent) {
            slot.children.retain(|&child| child != id);
        }
    }

    fn unregister(&mut self, ids: &[ElementId]) -> Vec<(ElementId, ElementData)> {
        ids.iter()
            .filter_map(|id| self.elements.remove(id).map(|data| (*id, data)))
            .collect()
    }

    /// Remove everything, returning the data of every element.
    pub fn drain(&mut self) -> Vec<(ElementId, ElementData)> {
        let mut all: Vec<_> = self.elements.drain().collect();
        all.sort_unstable_by_key(|(id, _)| *id);
        all
    }

    // ── Serialization ────────────────────────────────────────────────

    /// Serialize an element for the browser.
    ///
    /// With no keys every field is included; otherwise only the requested ones.
    pub fn serialize(&self, id: ElementId, keys: &[&str]) -> Result<Map<String, Value>> {
        let data = self.get(id)?;
        let keys = if keys.is_empty() { SERIAL_KEYS } else { keys };
        let mut result = Map::new();
        for &key in keys {
            let value = match key {
                "id" => Value::from(id.0),
                "tag" => Value::from(data.tag.clone()),
                "class" => to_value(&data.classes),
                "style" => to_value(&data.style),
                "props" => to_value(&data.props),
                "text" => Value::from(data.text.clone()),
                "slots" => to_value(&data.slot_map()),
                "events" => to_value(&listener::describe(&data.listeners)),
                other => return Err(Error::UnknownKey(other.to_owned())),
            };
            result.insert(key.to_owned(), value);
        }
        Ok(result)
    }
}

fn to_value(value: &impl serde::Serialize) -> Value {
    // Maps with string keys and plain data never fail to serialize.
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::DEFAULT_SLOT;
    use pretty_assertions::assert_eq;

    /// Build a small test tree:
    /// ```text
    ///       root
    ///      /    \
    ///    a        b
    ///   / \
    ///  c   d
    /// ```
    fn build_tree() -> (ElementTree, [ElementId; 5]) {
        let mut tree = ElementTree::new();
        let root = tree.create("body", None).unwrap();
        let a = tree.create("div", Some(SlotRef::default_of(root))).unwrap();
        let b = tree.create("div", Some(SlotRef::default_of(root))).unwrap();
        let c = tree.create("button", Some(SlotRef::default_of(a))).unwrap();
        let d = tree.create("label", Some(SlotRef::default_of(a))).unwrap();
        (tree, [root, a, b, c, d])
    }

    // ── Create ───────────────────────────────────────────────────────

    #[test]
    fn ids_are_monotonic() {
        let (_, [root, a, b, c, d]) = build_tree();
        assert_eq!(
            vec![root, a, b, c, d],
            (0..5).map(ElementId).collect::<Vec<_>>()
        );
    }

    #[test]
    fn create_attaches_to_parent_slot() {
        let (tree, [root, a, b, c, d]) = build_tree();
        assert_eq!(tree.get(root).unwrap().slots[DEFAULT_SLOT].children, vec![a, b]);
        assert_eq!(tree.parent(c), Some(a));
        assert_eq!(tree.parent(d), Some(a));
        assert_eq!(tree.parent(root), None);
    }

    #[test]
    fn create_into_missing_slot_fails() {
        let (mut tree, [root, ..]) = build_tree();
        let before = tree.len();
        let err = tree.create("x", Some(SlotRef::new(root, "header"))).unwrap_err();
        assert!(matches!(err, Error::SlotNotFound { .. }));
        assert_eq!(tree.len(), before);
    }

    #[test]
    fn create_into_named_slot() {
        let (mut tree, [_, a, ..]) = build_tree();
        assert!(tree.add_slot(a, "header").unwrap());
        assert!(!tree.add_slot(a, "header").unwrap());
        let h = tree.create("span", Some(SlotRef::new(a, "header"))).unwrap();
        assert_eq!(tree.get(a).unwrap().slots["header"].children, vec![h]);
    }

    // ── Mutation ─────────────────────────────────────────────────────

    #[test]
    fn modify_classes_reports_change() {
        let (mut tree, [root, ..]) = build_tree();
        assert!(tree.modify_classes(root, &Change::add("a b")).unwrap());
        assert!(!tree.modify_classes(root, &Change::add("b a")).unwrap());
        assert_eq!(tree.get(root).unwrap().classes, vec!["a", "b"]);
    }

    #[test]
    fn modify_style_and_props_report_change() {
        let (mut tree, [root, ..]) = build_tree();
        assert!(tree.modify_style(root, &Change::add("color: red")).unwrap());
        assert!(!tree.modify_style(root, &Change::add("color: red")).unwrap());
        assert!(tree.modify_props(root, &Change::add("flat")).unwrap());
        assert!(!tree.modify_props(root, &Change::add("flat")).unwrap());
        assert!(!tree.modify_props(root, &Change::remove("dense")).unwrap());
    }

    #[test]
    fn reordered_style_and_props_are_unchanged() {
        let (mut tree, [root, ..]) = build_tree();
        tree.modify_style(root, &Change::add("a: 1; b: 2")).unwrap();
        tree.modify_props(root, &Change::add("x=1 y=2")).unwrap();
        assert!(!tree.modify_style(root, &Change::replace("b: 2; a: 1")).unwrap());
        assert!(!tree.modify_props(root, &Change::replace("y=2 x=1")).unwrap());
        let keys: Vec<_> = tree.get(root).unwrap().style.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn parse_error_leaves_element_unchanged() {
        let (mut tree, [root, ..]) = build_tree();
        tree.modify_props(root, &Change::add("a=1")).unwrap();
        let err = tree.modify_props(root, &Change::add("b=2 c=")).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert_eq!(tree.get(root).unwrap().props.len(), 1);
    }

    #[test]
    fn set_text() {
        let (mut tree, [_, _, _, _, d]) = build_tree();
        assert!(tree.set_text(d, "A").unwrap());
        assert!(!tree.set_text(d, "A").unwrap());
        assert_eq!(tree.get(d).unwrap().text, "A");
    }

    // ── Walks ────────────────────────────────────────────────────────

    #[test]
    fn collect_descendant_ids_depth_first() {
        let (tree, [root, a, b, c, d]) = build_tree();
        assert_eq!(tree.collect_descendant_ids(root).unwrap(), vec![root, a, c, d, b]);
        assert_eq!(tree.collect_descendant_ids(a).unwrap(), vec![a, c, d]);
    }

    #[test]
    fn ancestors() {
        let (tree, [root, a, _, c, _]) = build_tree();
        assert_eq!(tree.ancestors(c), vec![a, root]);
        assert!(tree.ancestors(root).is_empty());
        assert_eq!(tree.top_of(c), Some(root));
        assert_eq!(tree.top_of(root), Some(root));
        assert_eq!(tree.top_of(ElementId(99)), None);
    }

    // ── Clear / remove ───────────────────────────────────────────────

    #[test]
    fn clear_unregisters_descendants() {
        let (mut tree, [root, a, b, c, d]) = build_tree();
        let removed = tree.clear(root).unwrap();
        let removed_ids: Vec<_> = removed.iter().map(|(id, _)| *id).collect();
        assert_eq!(removed_ids, vec![a, c, d, b]);
        assert!(tree.contains(root));
        assert_eq!(tree.len(), 1);
        for id in [a, b, c, d] {
            assert_eq!(tree.collect_descendant_ids(id), Err(Error::ElementNotFound(id)));
        }
    }

    #[test]
    fn remove_by_identity_indirect() {
        let (mut tree, [root, a, b, c, d]) = build_tree();
        let (changed, removed) = tree.remove(root, RemoveTarget::Element(c)).unwrap();
        assert_eq!(changed, a);
        assert_eq!(removed.len(), 1);
        assert_eq!(tree.get(a).unwrap().slots[DEFAULT_SLOT].children, vec![d]);
        assert!(tree.contains(b));
    }

    #[test]
    fn remove_by_index_takes_subtree() {
        let (mut tree, [root, a, b, c, d]) = build_tree();
        let (changed, removed) = tree.remove(root, RemoveTarget::Index(0)).unwrap();
        assert_eq!(changed, root);
        assert_eq!(removed.len(), 3);
        assert!(!tree.contains(a) && !tree.contains(c) && !tree.contains(d));
        assert_eq!(tree.get(root).unwrap().slots[DEFAULT_SLOT].children, vec![b]);
    }

    #[test]
    fn remove_index_out_of_range() {
        let (mut tree, [root, ..]) = build_tree();
        let err = tree.remove(root, RemoveTarget::Index(5)).unwrap_err();
        assert_eq!(err, Error::ChildIndexOutOfRange { index: 5, len: 2 });
    }

    #[test]
    fn remove_unknown_or_foreign_element() {
        let (mut tree, [_, a, b, ..]) = build_tree();
        assert_eq!(
            tree.remove(a, RemoveTarget::Element(ElementId(99))).unwrap_err(),
            Error::ElementNotFound(ElementId(99))
        );
        assert_eq!(
            tree.remove(a, RemoveTarget::Element(b)).unwrap_err(),
            Error::NotADescendant { parent: a, child: b }
        );
    }

    #[test]
    fn move_to_reparents_subtree() {
        let (mut tree, [root, a, b, c, d]) = build_tree();
        tree.move_to(a, SlotRef::default_of(b)).unwrap();
        assert_eq!(tree.ancestors(c), vec![a, b, root]);
        assert_eq!(tree.get(root).unwrap().slots[DEFAULT_SLOT].children, vec![b]);
        assert_eq!(tree.collect_descendant_ids(b).unwrap(), vec![b, a, c, d]);
    }

    #[test]
    fn move_into_own_subtree_fails() {
        let (mut tree, [_, a, _, c, _]) = build_tree();
        assert!(tree.move_to(a, SlotRef::default_of(c)).is_err());
        assert_eq!(tree.parent(c), Some(a));
    }

    // ── Serialization ────────────────────────────────────────────────

    #[test]
    fn serialize_all_keys() {
        let (mut tree, [_, a, _, c, d]) = build_tree();
        tree.modify_classes(a, &Change::add("row")).unwrap();
        let json = Value::Object(tree.serialize(a, &[]).unwrap());
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1,
                "tag": "div",
                "class": ["row"],
                "style": {},
                "props": {},
                "text": "",
                "slots": {"default": [c.0, d.0]},
                "events": {},
            })
        );
    }

    #[test]
    fn serialize_selected_keys() {
        let (tree, [root, ..]) = build_tree();
        let json = tree.serialize(root, &["tag", "id"]).unwrap();
        assert_eq!(json.keys().collect::<Vec<_>>(), vec!["tag", "id"]);
    }

    #[test]
    fn serialize_unknown_key() {
        let (tree, [root, ..]) = build_tree();
        assert_eq!(
            tree.serialize(root, &["tag", "color"]).unwrap_err(),
            Error::UnknownKey("color".into())
        );
    }
}
