//! Client: one browser connection and the element tree it mirrors.
//!
//! A [`Client`] is a cheap-clone handle. It owns the client's
//! [`ElementTree`], its connection state and its connect/disconnect hooks,
//! and holds a weak reference back to the [`App`] so that a deleted
//! application does not stay alive through its clients.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::app::{App, AppInner};
use crate::dom::node::{ElementData, ElementId, SlotRef};
use crate::dom::tree::ElementTree;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::event::handler;
use crate::event::message::EventMessage;
use crate::outbox::Target;
use crate::ui::Ui;

// ---------------------------------------------------------------------------
// ClientId / ConnectionState
// ---------------------------------------------------------------------------

/// Identifier of a client, unique within its application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the browser side has confirmed the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Page served, browser has not connected yet.
    #[default]
    Pending,
    /// Browser connected.
    Connected,
    /// Browser went away.
    Disconnected,
}

type ClientHook = Rc<dyn Fn(&Client)>;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub(crate) struct ClientInner {
    id: ClientId,
    app: Weak<AppInner>,
    shared: bool,
    tree: RefCell<ElementTree>,
    root: ElementId,
    connection: watch::Sender<ConnectionState>,
    connect_hooks: RefCell<Vec<ClientHook>>,
    disconnect_hooks: RefCell<Vec<ClientHook>>,
    deleted: Cell<bool>,
}

/// Handle to one browser connection.
#[derive(Clone)]
pub struct Client {
    inner: Rc<ClientInner>,
}

impl Client {
    /// Build a client with its `body` root element. Called by [`App::new_client`].
    pub(crate) fn new(id: ClientId, app: Weak<AppInner>, shared: bool) -> Self {
        let mut tree = ElementTree::new();
        // An empty tree always accepts a parentless element.
        let root = tree.create("body", None).unwrap_or(ElementId(0));
        let (connection, _) = watch::channel(ConnectionState::Pending);
        Self {
            inner: Rc::new(ClientInner {
                id,
                app,
                shared,
                tree: RefCell::new(tree),
                root,
                connection,
                connect_hooks: RefCell::new(Vec::new()),
                disconnect_hooks: RefCell::new(Vec::new()),
                deleted: Cell::new(false),
            }),
        }
    }

    /// This client's id.
    pub fn id(&self) -> ClientId {
        self.inner.id
    }

    /// Whether one tree is served to many browsers (auto-index page).
    pub fn is_shared(&self) -> bool {
        self.inner.shared
    }

    /// The owning application, if it is still alive.
    pub fn app(&self) -> Option<App> {
        self.inner.app.upgrade().map(App::from_inner)
    }

    /// Whether [`App::delete_client`] has run for this client.
    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.get()
    }

    /// The `body` element every client starts with.
    pub fn root(&self) -> Element {
        Element::new(self.clone(), self.inner.root)
    }

    /// A construction context rooted at the root element's default slot.
    pub fn ui(&self) -> Ui {
        Ui::new(self.clone(), SlotRef::default_of(self.inner.root))
    }

    // ── Connection ───────────────────────────────────────────────────

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection.borrow()
    }

    /// Mark the browser as connected and run the connect hooks.
    pub fn connect(&self) {
        self.inner.connection.send_replace(ConnectionState::Connected);
        tracing::debug!(client = %self.id(), "client connected");
        let hooks = self.inner.connect_hooks.borrow().clone();
        for hook in hooks {
            hook(self);
        }
    }

    /// Mark the browser as gone and run the disconnect hooks.
    pub fn disconnect(&self) {
        self.inner.connection.send_replace(ConnectionState::Disconnected);
        tracing::debug!(client = %self.id(), "client disconnected");
        let hooks = self.inner.disconnect_hooks.borrow().clone();
        for hook in hooks {
            hook(self);
        }
    }

    /// Register a hook run on every [`connect`](Self::connect).
    pub fn on_connect(&self, hook: impl Fn(&Client) + 'static) {
        self.inner.connect_hooks.borrow_mut().push(Rc::new(hook));
    }

    /// Register a hook run on every [`disconnect`](Self::disconnect).
    pub fn on_disconnect(&self, hook: impl Fn(&Client) + 'static) {
        self.inner.disconnect_hooks.borrow_mut().push(Rc::new(hook));
    }

    /// Resolve once the browser has connected.
    ///
    /// Shared clients resolve immediately. Otherwise fails with
    /// [`Error::Timeout`] if no connection arrives within `timeout`.
    pub async fn connected(&self, timeout: Duration) -> Result<()> {
        if self.inner.shared {
            return Ok(());
        }
        let mut rx = self.inner.connection.subscribe();
        let connected = async {
            rx.wait_for(|state| *state == ConnectionState::Connected)
                .await
                .is_ok()
        };
        match tokio::time::timeout(timeout, connected).await {
            Ok(true) => Ok(()),
            _ => Err(Error::Timeout {
                what: format!("connection of client {}", self.id()),
                after: timeout,
            }),
        }
    }

    // ── Elements ─────────────────────────────────────────────────────

    /// Handle for a registered element.
    pub fn element(&self, id: ElementId) -> Option<Element> {
        self.contains(id).then(|| Element::new(self.clone(), id))
    }

    /// Whether an element with this id is registered.
    pub fn contains(&self, id: ElementId) -> bool {
        self.inner.tree.borrow().contains(id)
    }

    /// Number of registered elements, the root included.
    pub fn len(&self) -> usize {
        self.inner.tree.borrow().len()
    }

    /// Whether no element is registered (only after deletion).
    pub fn is_empty(&self) -> bool {
        self.inner.tree.borrow().is_empty()
    }

    /// Read access to the element tree.
    ///
    /// The tree is borrowed for the duration of `f`; `f` must not call back
    /// into mutating element methods.
    pub fn with_tree<R>(&self, f: impl FnOnce(&ElementTree) -> R) -> R {
        f(&self.inner.tree.borrow())
    }

    pub(crate) fn with_tree_mut<R>(&self, f: impl FnOnce(&mut ElementTree) -> R) -> R {
        f(&mut self.inner.tree.borrow_mut())
    }

    /// Register a new element and announce it together with its parent.
    pub(crate) fn create_element(&self, tag: &str, parent: Option<SlotRef>) -> Result<Element> {
        let owner = parent.as_ref().map(|slot| slot.element);
        let id = self.with_tree_mut(|tree| tree.create(tag, parent))?;
        self.enqueue_update(id);
        if let Some(owner) = owner {
            self.enqueue_update(owner);
        }
        Ok(Element::new(self.clone(), id))
    }

    /// Whether `id` is the root or hangs below it.
    pub fn is_attached(&self, id: ElementId) -> bool {
        self.with_tree(|tree| tree.top_of(id)) == Some(self.inner.root)
    }

    /// Mark an element as changed in the application outbox.
    ///
    /// Elements outside the root's subtree are not sent; they are announced
    /// when moved under the root.
    pub(crate) fn enqueue_update(&self, id: ElementId) {
        if !self.is_attached(id) {
            return;
        }
        if let Some(app) = self.app() {
            app.outbox_mut().enqueue_update(self.id(), id);
        }
    }

    /// Queue a message addressed to this client.
    pub(crate) fn enqueue_message(&self, kind: &str, payload: Value) {
        if let Some(app) = self.app() {
            app.outbox_mut()
                .enqueue_message(kind, payload, Target::Client(self.id()));
        }
    }

    /// Run teardown hooks of elements that were just unregistered.
    ///
    /// Must be called after the tree borrow is released.
    pub(crate) fn release(&self, removed: Vec<(ElementId, ElementData)>) {
        for (id, data) in removed {
            for hook in &data.teardown {
                (hook.0)(id);
            }
        }
    }

    /// Tear the whole tree down. Called by [`App::delete_client`].
    pub(crate) fn teardown(&self) {
        self.inner.deleted.set(true);
        let removed = self.with_tree_mut(ElementTree::drain);
        self.release(removed);
        self.inner.connect_hooks.borrow_mut().clear();
        self.inner.disconnect_hooks.borrow_mut().clear();
    }

    /// Send an error to the application's exception handlers.
    pub(crate) fn report(&self, err: &Error) {
        match self.app() {
            Some(app) => app.handle_exception(err),
            None => tracing::error!(client = %self.id(), error = %err, "unhandled error"),
        }
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Route an inbound browser event to the matching listeners.
    ///
    /// Returns the number of listeners invoked.
    pub fn handle_event(&self, msg: EventMessage) -> usize {
        handler::dispatch(self, msg)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// All elements with the given tag, in id order.
    pub fn find_by_tag(&self, tag: &str) -> Vec<Element> {
        let ids = self.with_tree(|tree| tree.query_by_tag(tag));
        self.handles(ids)
    }

    /// All elements carrying the given class, in id order.
    pub fn find_by_class(&self, class: &str) -> Vec<Element> {
        let ids = self.with_tree(|tree| tree.query_by_class(class));
        self.handles(ids)
    }

    /// All elements whose text contains `needle`, in id order.
    pub fn find_by_text(&self, needle: &str) -> Vec<Element> {
        let ids = self.with_tree(|tree| tree.query_by_text(needle));
        self.handles(ids)
    }

    fn handles(&self, ids: Vec<ElementId>) -> Vec<Element> {
        ids.into_iter()
            .map(|id| Element::new(self.clone(), id))
            .collect()
    }

    /// Whether two handles point at the same client.
    pub fn ptr_eq(&self, other: &Client) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("shared", &self.inner.shared)
            .field("elements", &self.len())
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
