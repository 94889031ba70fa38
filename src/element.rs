//! Element handle: the programming surface for one node of a client's tree.
//!
//! An [`Element`] is a `(Client, ElementId)` pair. It stays valid as a value
//! after the element is removed; every operation then fails with
//! [`Error::ElementNotFound`]. Every mutation that changes observable state
//! marks the element for the next outbox flush, and no-op mutations mark
//! nothing.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::client::Client;
use crate::css::Change;
use crate::dom::node::{ElementId, SlotRef, TeardownHook, DEFAULT_SLOT};
use crate::dom::tree::RemoveTarget;
use crate::error::{Error, Result};
use crate::event::handler::EventArguments;
use crate::event::listener::{EventListener, ListenerSummary};
use crate::outbox::RUN_METHOD;

/// Handle to one element of a client's tree.
#[derive(Clone)]
pub struct Element {
    client: Client,
    id: ElementId,
}

impl Element {
    pub(crate) fn new(client: Client, id: ElementId) -> Self {
        Self { client, id }
    }

    /// The element's id.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// The client owning this element.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Whether the element is still registered.
    pub fn exists(&self) -> bool {
        self.client.contains(self.id)
    }

    /// Reference to one of this element's slots.
    pub fn slot(&self, name: &str) -> Result<SlotRef> {
        self.client.with_tree(|tree| {
            if tree.get(self.id)?.slots.contains_key(name) {
                Ok(SlotRef::new(self.id, name))
            } else {
                Err(Error::SlotNotFound {
                    element: self.id,
                    name: name.to_owned(),
                })
            }
        })
    }

    /// Reference to the default slot.
    pub fn default_slot(&self) -> SlotRef {
        SlotRef::default_of(self.id)
    }

    /// Add a named slot, returning a reference to it.
    pub fn add_slot(&self, name: &str) -> Result<SlotRef> {
        if self.client.with_tree_mut(|tree| tree.add_slot(self.id, name))? {
            self.client.enqueue_update(self.id);
        }
        Ok(SlotRef::new(self.id, name))
    }

    // ── Read access ──────────────────────────────────────────────────

    /// The element's tag.
    pub fn tag(&self) -> Result<String> {
        self.client.with_tree(|tree| Ok(tree.get(self.id)?.tag.clone()))
    }

    /// The element's text content.
    pub fn text(&self) -> Result<String> {
        self.client.with_tree(|tree| Ok(tree.get(self.id)?.text.clone()))
    }

    /// The element's classes in insertion order.
    pub fn class_list(&self) -> Result<Vec<String>> {
        self.client.with_tree(|tree| Ok(tree.get(self.id)?.classes.clone()))
    }

    /// A single prop value.
    pub fn prop(&self, key: &str) -> Result<Option<Value>> {
        self.client
            .with_tree(|tree| Ok(tree.get(self.id)?.props.get(key).cloned()))
    }

    /// A single style value.
    pub fn style_value(&self, key: &str) -> Result<Option<String>> {
        self.client
            .with_tree(|tree| Ok(tree.get(self.id)?.style.get(key).cloned()))
    }

    /// Direct children across slots, in slot order then child order.
    pub fn children(&self) -> Result<Vec<Element>> {
        let ids: Vec<_> = self
            .client
            .with_tree(|tree| Ok::<_, Error>(tree.get(self.id)?.children().collect()))?;
        Ok(ids
            .into_iter()
            .map(|id| Element::new(self.client.clone(), id))
            .collect())
    }

    /// The element whose slot holds this one.
    pub fn parent(&self) -> Option<Element> {
        self.client
            .with_tree(|tree| tree.parent(self.id))
            .map(|id| Element::new(self.client.clone(), id))
    }

    /// Own id followed by every descendant's id, depth first.
    pub fn collect_descendant_ids(&self) -> Result<Vec<ElementId>> {
        self.client.with_tree(|tree| tree.collect_descendant_ids(self.id))
    }

    /// Serialize for the browser; empty `keys` selects every field.
    pub fn to_dict(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        self.client.with_tree(|tree| tree.serialize(self.id, keys))
    }

    /// Merged listener advertisement for one base event.
    pub fn listener_summary(&self, base: &str) -> Result<Option<ListenerSummary>> {
        self.client
            .with_tree(|tree| tree.listener_summary(self.id, base))
    }

    // ── Mutation ─────────────────────────────────────────────────────

    fn mutate(
        &self,
        f: impl FnOnce(&mut crate::dom::ElementTree) -> Result<bool>,
    ) -> Result<&Self> {
        if self.client.with_tree_mut(f)? {
            self.client.enqueue_update(self.id);
        }
        Ok(self)
    }

    /// Add, remove or replace classes.
    ///
    /// ```ignore
    /// label.classes("text-bold")?;
    /// label.classes(Change::remove("text-bold").and_add("text-italic"))?;
    /// ```
    pub fn classes<'a>(&self, change: impl Into<Change<'a>>) -> Result<&Self> {
        let change = change.into();
        self.mutate(|tree| tree.modify_classes(self.id, &change))
    }

    /// Add, remove or replace inline style declarations.
    pub fn style<'a>(&self, change: impl Into<Change<'a>>) -> Result<&Self> {
        let change = change.into();
        self.mutate(|tree| tree.modify_style(self.id, &change))
    }

    /// Add, remove or replace props.
    pub fn props<'a>(&self, change: impl Into<Change<'a>>) -> Result<&Self> {
        let change = change.into();
        self.mutate(|tree| tree.modify_props(self.id, &change))
    }

    /// Set one prop to an arbitrary JSON value.
    pub fn set_prop(&self, key: &str, value: impl Into<Value>) -> Result<&Self> {
        let value = value.into();
        self.mutate(|tree| tree.set_prop(self.id, key, value))
    }

    /// Replace the text content.
    pub fn set_text(&self, text: &str) -> Result<&Self> {
        self.mutate(|tree| tree.set_text(self.id, text))
    }

    /// Mark the element for the next flush without changing anything.
    pub fn update(&self) {
        self.client.enqueue_update(self.id);
    }

    /// Ask the browser to call a method on this element's component.
    ///
    /// Messages are delivered in order and never coalesced.
    pub fn run_method(&self, name: &str, args: Vec<Value>) {
        self.client.enqueue_message(
            RUN_METHOD,
            json!({"id": self.id, "name": name, "args": args}),
        );
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Register a handler for a listener type such as `click` or
    /// `keydown.enter.stop`, reporting all arguments.
    pub fn on<F>(&self, ty: &str, handler: F) -> Result<&Self>
    where
        F: Fn(&EventArguments) -> Result<()> + 'static,
    {
        let throttle = self
            .client
            .app()
            .map_or(Duration::ZERO, |app| app.config().default_throttle);
        self.on_with(EventListener::new(ty, Rc::new(handler)).with_throttle(throttle))
    }

    /// Register a fully configured listener.
    pub fn on_with(&self, listener: EventListener) -> Result<&Self> {
        self.client
            .with_tree_mut(|tree| tree.add_listener(self.id, listener))?;
        self.client.enqueue_update(self.id);
        Ok(self)
    }

    // ── Structure ────────────────────────────────────────────────────

    /// Remove every descendant. The element itself stays.
    pub fn clear(&self) -> Result<()> {
        let removed = self.client.with_tree_mut(|tree| tree.clear(self.id))?;
        if !removed.is_empty() {
            self.client.enqueue_update(self.id);
        }
        self.client.release(removed);
        Ok(())
    }

    /// Remove a descendant, by identity or by position among direct children.
    pub fn remove(&self, target: impl Into<RemoveTarget>) -> Result<()> {
        let target = target.into();
        let (changed, removed) = self
            .client
            .with_tree_mut(|tree| tree.remove(self.id, target))?;
        self.client.enqueue_update(changed);
        self.client.release(removed);
        Ok(())
    }

    /// Remove this element (and its subtree) from the tree.
    pub fn delete(&self) -> Result<()> {
        let parent = self.client.with_tree(|tree| tree.parent(self.id));
        let removed = self.client.with_tree_mut(|tree| tree.delete_subtree(self.id))?;
        if let Some(parent) = parent {
            self.client.enqueue_update(parent);
        }
        self.client.release(removed);
        Ok(())
    }

    /// Move this element to the end of another element's default slot.
    pub fn move_to(&self, target: &Element) -> Result<()> {
        self.move_to_slot(SlotRef::new(target.id, DEFAULT_SLOT))
    }

    /// Move this element to the end of the given slot.
    pub fn move_to_slot(&self, target: SlotRef) -> Result<()> {
        let old_parent = self.client.with_tree(|tree| tree.parent(self.id));
        let was_attached = self.client.is_attached(self.id);
        let new_parent = target.element;
        self.client.with_tree_mut(|tree| tree.move_to(self.id, target))?;
        if let Some(old_parent) = old_parent {
            self.client.enqueue_update(old_parent);
        }
        self.client.enqueue_update(new_parent);
        // The subtree was never sent while it was detached.
        if !was_attached && self.client.is_attached(self.id) {
            for id in self.collect_descendant_ids()? {
                self.client.enqueue_update(id);
            }
        }
        Ok(())
    }

    /// Run `hook` when this element is removed or its client is deleted.
    pub fn on_delete(&self, hook: impl Fn(ElementId) + 'static) -> Result<&Self> {
        self.client.with_tree_mut(|tree| {
            tree.get_mut(self.id)?
                .teardown
                .push(TeardownHook(Rc::new(hook)));
            Ok::<_, Error>(())
        })?;
        Ok(self)
    }
}

impl From<&Element> for RemoveTarget {
    fn from(element: &Element) -> Self {
        Self::Element(element.id)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.client.ptr_eq(&other.client)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("client", &self.client.id())
            .field("id", &self.id)
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
