//! Timer: a callback run periodically (or once) on behalf of a slot.
//!
//! A timer captures the construction context it was created in, so elements
//! its callback creates land in the same slot. It waits for its client to
//! connect before the first invocation and stops by itself when the client is
//! deleted, the owning element is removed, the timer is canceled or the
//! application shuts down.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;

use crate::app::{App, LifecycleState};
use crate::error::{Error, Result};
use crate::event::handler::panic_message;
use crate::ui::Ui;

slotmap::new_key_type! {
    /// Key of a live timer in the application's timer registry.
    pub struct TimerKey;
}

type LocalFuture = Pin<Box<dyn Future<Output = Result<()>>>>;
type Callback = Box<dyn FnMut(Ui) -> LocalFuture>;

// ---------------------------------------------------------------------------
// TimerPhase
// ---------------------------------------------------------------------------

/// Where a timer is in its life: `Created → Running ⇄ Deactivated → Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// Constructed, drive loop not started yet.
    Created,
    /// Loop running, callback invoked every interval.
    Running,
    /// Loop running, invocations skipped.
    Deactivated,
    /// Finished; cannot be activated again.
    Canceled,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

struct TimerState {
    ui: Ui,
    interval: Cell<Duration>,
    once: bool,
    active: Cell<bool>,
    started: Cell<bool>,
    canceled: Cell<bool>,
    callback: RefCell<Option<Callback>>,
    key: Cell<Option<TimerKey>>,
}

/// Handle to a timer. Clones control the same timer.
#[derive(Clone)]
pub struct Timer {
    state: Rc<TimerState>,
}

impl Timer {
    /// Run `callback` every `interval`.
    pub fn new<F>(ui: &Ui, interval: Duration, mut callback: F) -> Result<Self>
    where
        F: FnMut(&Ui) -> Result<()> + 'static,
    {
        Self::build(
            ui,
            interval,
            false,
            Box::new(move |ui: Ui| -> LocalFuture {
                let result = callback(&ui);
                Box::pin(std::future::ready(result))
            }),
        )
    }

    /// Run an async `callback` every `interval`.
    ///
    /// The time spent awaiting the callback counts towards the interval.
    pub fn new_async<F, Fut>(ui: &Ui, interval: Duration, mut callback: F) -> Result<Self>
    where
        F: FnMut(Ui) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        Self::build(
            ui,
            interval,
            false,
            Box::new(move |ui: Ui| -> LocalFuture { Box::pin(callback(ui)) }),
        )
    }

    /// Run `callback` once after `delay`.
    pub fn once<F>(ui: &Ui, delay: Duration, callback: F) -> Result<Self>
    where
        F: FnOnce(&Ui) -> Result<()> + 'static,
    {
        let mut callback = Some(callback);
        Self::build(
            ui,
            delay,
            true,
            Box::new(move |ui: Ui| -> LocalFuture {
                let result = callback.take().map_or(Ok(()), |f| f(&ui));
                Box::pin(std::future::ready(result))
            }),
        )
    }

    fn build(ui: &Ui, interval: Duration, once: bool, callback: Callback) -> Result<Self> {
        let client = ui.client();
        let app = client.app().ok_or(Error::Detached(client.id().0))?;
        let timer = Self {
            state: Rc::new(TimerState {
                ui: ui.fork(ui.current_slot()),
                interval: Cell::new(interval),
                once,
                active: Cell::new(true),
                started: Cell::new(false),
                canceled: Cell::new(false),
                callback: RefCell::new(Some(callback)),
                key: Cell::new(None),
            }),
        };
        let key = app.register_timer(timer.clone());
        timer.state.key.set(Some(key));

        // Otherwise `App::start` spawns every registered timer once startup
        // hooks have run.
        if app.state() == LifecycleState::Started {
            timer.spawn();
        }
        Ok(timer)
    }

    /// Start the drive loop on the current `LocalSet`. Runs at most once.
    pub(crate) fn spawn(&self) {
        if self.state.started.replace(true) || self.state.canceled.get() {
            return;
        }
        tokio::task::spawn_local(self.clone().drive());
    }

    // ── Control ──────────────────────────────────────────────────────

    /// Resume invocations.
    pub fn activate(&self) -> Result<()> {
        if self.state.canceled.get() {
            return Err(Error::TimerCanceled);
        }
        self.state.active.set(true);
        Ok(())
    }

    /// Skip invocations until [`activate`](Self::activate) is called.
    pub fn deactivate(&self) {
        self.state.active.set(false);
    }

    /// Stop for good. The loop exits at its next wake-up.
    pub fn cancel(&self) {
        self.state.canceled.set(true);
    }

    /// Change the interval; takes effect after the current sleep.
    pub fn set_interval(&self, interval: Duration) {
        self.state.interval.set(interval);
    }

    /// The current interval.
    pub fn interval(&self) -> Duration {
        self.state.interval.get()
    }

    /// Whether invocations are enabled.
    pub fn is_active(&self) -> bool {
        self.state.active.get() && !self.state.canceled.get()
    }

    /// The timer's phase.
    pub fn phase(&self) -> TimerPhase {
        if self.state.canceled.get() {
            TimerPhase::Canceled
        } else if !self.state.started.get() {
            TimerPhase::Created
        } else if self.state.active.get() {
            TimerPhase::Running
        } else {
            TimerPhase::Deactivated
        }
    }

    // ── Drive loop ───────────────────────────────────────────────────

    async fn drive(self) {
        let _finish = FinishOnDrop(self.clone());
        let client = self.state.ui.client().clone();
        let Some(app) = client.app() else {
            return;
        };
        if let Err(err) = client.connected(app.config().connect_timeout).await {
            tracing::warn!(
                client = %client.id(),
                error = %err,
                "timer canceled, client never connected"
            );
            app.handle_exception(&err);
            return;
        }

        if self.state.once {
            tokio::time::sleep(self.interval()).await;
            if self.should_continue(&app) && self.state.active.get() {
                self.invoke(&app).await;
            }
        } else {
            while self.should_continue(&app) {
                let started = Instant::now();
                if self.state.active.get() {
                    self.invoke(&app).await;
                }
                let elapsed = started.elapsed();
                tokio::time::sleep(self.interval().saturating_sub(elapsed)).await;
            }
        }
    }

    fn should_continue(&self, app: &App) -> bool {
        let client = self.state.ui.client();
        !self.state.canceled.get()
            && app.has_client(client.id())
            && client.contains(self.state.ui.current_slot().element)
            && !matches!(app.state(), LifecycleState::Stopping | LifecycleState::Stopped)
    }

    async fn invoke(&self, app: &App) {
        // Taken out while running so the callback may control this timer.
        let Some(mut callback) = self.state.callback.borrow_mut().take() else {
            return;
        };
        let ui = self.state.ui.clone();
        // Sync callbacks run while the future is built, async ones while it is polled.
        let result = match panic::catch_unwind(AssertUnwindSafe(|| callback(ui))) {
            Ok(future) => AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(panicked(payload.as_ref()))),
            Err(payload) => Err(panicked(payload.as_ref())),
        };
        if !self.state.canceled.get() {
            *self.state.callback.borrow_mut() = Some(callback);
        }
        if let Err(err) = result {
            app.handle_exception(&err);
        }
    }

    fn finish(&self) {
        self.state.canceled.set(true);
        self.state.callback.borrow_mut().take();
        let Some(key) = self.state.key.take() else {
            return;
        };
        if let Some(app) = self.state.ui.client().app() {
            app.unregister_timer(key);
        }
    }
}

fn panicked(payload: &(dyn Any + Send)) -> Error {
    Error::Handler(panic_message(payload))
}

/// Marks the timer finished however the drive loop ends.
struct FinishOnDrop(Timer);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.finish();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("interval", &self.interval())
            .field("once", &self.state.once)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
