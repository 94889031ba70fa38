//! App: process context, lifecycle and the outbound flush.
//!
//! [`App`] is a cheap-clone handle to everything that is process-wide: the
//! client registry, the outbox, lifecycle hooks, the exception reporters and
//! the registry of running timers. It is single-threaded (`Rc`-based); timers
//! run as `spawn_local` tasks, so [`App::start`] must be called inside a
//! `tokio::task::LocalSet` when timers are used.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use slotmap::SlotMap;

use crate::client::{Client, ClientId};
use crate::error::Error;
use crate::outbox::{Outbound, Outbox, Target, UPDATE};
use crate::timer::{Timer, TimerKey};

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Optional application title.
    pub title: Option<String>,
    /// How long a timer waits for its client to connect before giving up.
    pub connect_timeout: Duration,
    /// Throttle applied by [`Element::on`](crate::element::Element::on).
    pub default_throttle: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: None,
            connect_timeout: Duration::from_secs(60),
            default_throttle: Duration::ZERO,
        }
    }
}

impl AppConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the title (builder).
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the connection timeout (builder).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the default event throttle (builder).
    pub fn with_default_throttle(mut self, throttle: Duration) -> Self {
        self.default_throttle = throttle;
        self
    }
}

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Process lifecycle: `Stopped → Starting → Started → Stopping → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl LifecycleState {
    /// Whether the process is shutting down or down.
    pub fn is_stopping(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

type AppHook = Rc<dyn Fn(&App)>;
type ExceptionHandler = Rc<dyn Fn(&Error)>;

pub(crate) struct AppInner {
    config: AppConfig,
    state: Cell<LifecycleState>,
    clients: RefCell<IndexMap<ClientId, Client>>,
    next_client: Cell<u64>,
    outbox: RefCell<Outbox>,
    startup: RefCell<Vec<AppHook>>,
    shutdown: RefCell<Vec<AppHook>>,
    exception_handlers: RefCell<Vec<ExceptionHandler>>,
    timers: RefCell<SlotMap<TimerKey, Timer>>,
}

/// Handle to the process context.
#[derive(Clone)]
pub struct App {
    inner: Rc<AppInner>,
}

impl App {
    /// Create a stopped application without clients.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Rc::new(AppInner {
                config,
                state: Cell::new(LifecycleState::Stopped),
                clients: RefCell::new(IndexMap::new()),
                next_client: Cell::new(0),
                outbox: RefCell::new(Outbox::new()),
                startup: RefCell::new(Vec::new()),
                shutdown: RefCell::new(Vec::new()),
                exception_handlers: RefCell::new(Vec::new()),
                timers: RefCell::new(SlotMap::with_key()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<AppInner>) -> Self {
        Self { inner }
    }

    /// The configuration this app was created with.
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    // ── Clients ──────────────────────────────────────────────────────

    /// Register a new client with a fresh `body` root.
    pub fn new_client(&self, shared: bool) -> Client {
        let id = ClientId(self.inner.next_client.get());
        self.inner.next_client.set(id.0 + 1);
        let client = Client::new(id, Rc::downgrade(&self.inner), shared);
        self.inner.clients.borrow_mut().insert(id, client.clone());
        self.outbox_mut().enqueue_update(id, client.root().id());
        tracing::debug!(client = %id, shared, "client created");
        client
    }

    /// Look up a registered client.
    pub fn client(&self, id: ClientId) -> Option<Client> {
        self.inner.clients.borrow().get(&id).cloned()
    }

    /// Whether the client is still registered.
    pub fn has_client(&self, id: ClientId) -> bool {
        self.inner.clients.borrow().contains_key(&id)
    }

    /// Ids of all registered clients, in creation order.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.inner.clients.borrow().keys().copied().collect()
    }

    /// Unregister a client, tearing its whole tree down.
    ///
    /// Every element's teardown hooks run, pending output for the client is
    /// dropped, and its timers stop at their next iteration.
    pub fn delete_client(&self, id: ClientId) {
        let Some(client) = self.inner.clients.borrow_mut().shift_remove(&id) else {
            return;
        };
        client.teardown();
        self.outbox_mut().forget(id);
        tracing::debug!(client = %id, "client deleted");
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Run `hook` on startup, or right away if the app is already started.
    pub fn on_startup(&self, hook: impl Fn(&App) + 'static) {
        if self.state() == LifecycleState::Started {
            hook(self);
        } else {
            self.inner.startup.borrow_mut().push(Rc::new(hook));
        }
    }

    /// Run `hook` on shutdown.
    pub fn on_shutdown(&self, hook: impl Fn(&App) + 'static) {
        self.inner.shutdown.borrow_mut().push(Rc::new(hook));
    }

    /// Start the application and run the startup hooks.
    pub fn start(&self) {
        if self.state() != LifecycleState::Stopped {
            return;
        }
        self.inner.state.set(LifecycleState::Starting);
        // Hooks may register further hooks; those run in this pass too.
        let mut next = 0;
        loop {
            let hook = self.inner.startup.borrow().get(next).cloned();
            let Some(hook) = hook else {
                break;
            };
            hook(self);
            next += 1;
        }
        self.inner.state.set(LifecycleState::Started);

        let timers: Vec<Timer> = self.inner.timers.borrow().values().cloned().collect();
        for timer in timers {
            timer.spawn();
        }
        tracing::debug!(timers = self.timer_count(), "app started");
    }

    /// Stop the application: cancel timers, run shutdown hooks, delete clients.
    pub fn stop(&self) {
        if self.state().is_stopping() {
            return;
        }
        self.inner.state.set(LifecycleState::Stopping);
        let timers: Vec<Timer> = self.inner.timers.borrow().values().cloned().collect();
        for timer in timers {
            timer.cancel();
        }
        // Timers that never started have no loop to unregister them.
        self.inner.timers.borrow_mut().clear();
        let hooks = self.inner.shutdown.borrow().clone();
        for hook in hooks {
            hook(self);
        }
        for id in self.client_ids() {
            self.delete_client(id);
        }
        self.inner.state.set(LifecycleState::Stopped);
        tracing::debug!("app stopped");
    }

    // ── Timers ───────────────────────────────────────────────────────

    pub(crate) fn register_timer(&self, timer: Timer) -> TimerKey {
        self.inner.timers.borrow_mut().insert(timer)
    }

    pub(crate) fn unregister_timer(&self, key: TimerKey) {
        self.inner.timers.borrow_mut().remove(key);
    }

    /// Number of timers that have not finished yet.
    pub fn timer_count(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    // ── Exceptions ───────────────────────────────────────────────────

    /// Register a handler called for every reported error.
    pub fn on_exception(&self, handler: impl Fn(&Error) + 'static) {
        self.inner.exception_handlers.borrow_mut().push(Rc::new(handler));
    }

    /// Central error reporter: logs the error and calls every handler.
    pub fn handle_exception(&self, err: &Error) {
        tracing::error!(error = %err, "unhandled error");
        let handlers = self.inner.exception_handlers.borrow().clone();
        for handler in handlers {
            handler(err);
        }
    }

    // ── Outbox ───────────────────────────────────────────────────────

    pub(crate) fn outbox_mut(&self) -> RefMut<'_, Outbox> {
        self.inner.outbox.borrow_mut()
    }

    /// Read access to the pending output.
    pub fn outbox(&self) -> Ref<'_, Outbox> {
        self.inner.outbox.borrow()
    }

    /// Distinct elements of `client` waiting to be sent.
    pub fn pending_updates(&self, client: ClientId) -> usize {
        self.outbox().pending_updates(client)
    }

    /// Queue a message for every connected client.
    pub fn broadcast(&self, kind: &str, payload: Value) {
        self.outbox_mut()
            .enqueue_message(kind, payload, Target::Broadcast);
    }

    /// Drain the outbox into transport-ready messages.
    ///
    /// Per target, in the order targets were first touched: one `update`
    /// message mapping element ids to their serialized form (`null` for
    /// elements that no longer exist), then every queued message in order.
    pub fn flush(&self) -> Vec<Outbound> {
        let batches = self.outbox_mut().drain();
        let mut out = Vec::new();
        for (target, batch) in batches {
            if !batch.updates.is_empty() {
                let client = match target {
                    Target::Client(id) => self.client(id),
                    Target::Broadcast => None,
                };
                let mut elements = Map::new();
                for id in &batch.updates {
                    let value = client
                        .as_ref()
                        .and_then(|c| c.with_tree(|tree| tree.serialize(*id, &[]).ok()))
                        .map_or(Value::Null, Value::Object);
                    elements.insert(id.to_string(), value);
                }
                out.push(Outbound {
                    target,
                    kind: UPDATE.to_owned(),
                    payload: Value::Object(elements),
                });
            }
            out.extend(batch.messages.into_iter().map(|(kind, payload)| Outbound {
                target,
                kind,
                payload,
            }));
        }
        tracing::trace!(messages = out.len(), "outbox flushed");
        out
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .field("clients", &self.inner.clients.borrow().len())
            .field("timers", &self.timer_count())
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
