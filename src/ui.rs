//! Construction context: where newly created elements land.
//!
//! A [`Ui`] carries an explicit stack of active slots. Entering an element
//! pushes one of its slots; the returned [`SlotGuard`] pops it again when
//! dropped, so early returns and panics cannot leave a stale slot behind.
//! Clones share the stack; [`Ui::fork`] starts an independent one, which is
//! what a background task (timer, async refresh) needs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::client::Client;
use crate::dom::node::SlotRef;
use crate::element::Element;
use crate::error::Result;

/// Construction context bound to one client.
#[derive(Clone)]
pub struct Ui {
    client: Client,
    stack: Rc<RefCell<Vec<SlotRef>>>,
}

impl Ui {
    /// A context whose bottom slot is `base`.
    pub fn new(client: Client, base: SlotRef) -> Self {
        Self {
            client,
            stack: Rc::new(RefCell::new(vec![base])),
        }
    }

    /// The client elements are created for.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The slot new elements are appended to.
    pub fn current_slot(&self) -> SlotRef {
        let stack = self.stack.borrow();
        // The base slot is never popped.
        stack
            .last()
            .cloned()
            .unwrap_or_else(|| SlotRef::default_of(self.client.root().id()))
    }

    /// Depth of the slot stack (1 = only the base slot).
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Create an element in the current slot.
    pub fn element(&self, tag: &str) -> Result<Element> {
        self.client.create_element(tag, Some(self.current_slot()))
    }

    /// Create an element attached to nothing.
    ///
    /// Used as a staging area; its children can later be moved elsewhere.
    pub fn detached(&self, tag: &str) -> Result<Element> {
        self.client.create_element(tag, None)
    }

    /// Make `element`'s default slot current until the guard drops.
    pub fn enter(&self, element: &Element) -> SlotGuard {
        self.push(element.default_slot())
    }

    /// Make a named slot of `element` current until the guard drops.
    pub fn enter_slot(&self, element: &Element, name: &str) -> Result<SlotGuard> {
        Ok(self.push(element.slot(name)?))
    }

    /// Run `f` with `element`'s default slot current.
    pub fn within<R>(&self, element: &Element, f: impl FnOnce(&Ui) -> R) -> R {
        let _guard = self.enter(element);
        f(self)
    }

    /// An independent context starting at `base`.
    pub fn fork(&self, base: SlotRef) -> Ui {
        Ui::new(self.client.clone(), base)
    }

    fn push(&self, slot: SlotRef) -> SlotGuard {
        let mut stack = self.stack.borrow_mut();
        let depth = stack.len();
        stack.push(slot);
        SlotGuard {
            stack: self.stack.clone(),
            depth,
        }
    }
}

impl std::fmt::Debug for Ui {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ui")
            .field("client", &self.client.id())
            .field("stack", &self.stack.borrow())
            .finish()
    }
}

/// Pops the slot it pushed (and anything pushed above it) on drop.
#[must_use = "the slot is left as soon as the guard is dropped"]
pub struct SlotGuard {
    stack: Rc<RefCell<Vec<SlotRef>>>,
    depth: usize,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.stack.borrow_mut().truncate(self.depth);
    }
}
