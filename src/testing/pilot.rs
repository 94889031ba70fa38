//! Pilot: programmatic interaction with a headless App.
//!
//! The `Pilot` owns an [`App`] with one connected client and provides
//! methods to simulate browser events, flush the outbox and render the tree
//! to text for assertions.

use std::cell::RefCell;
use std::rc::Rc;

use crate::app::{App, AppConfig};
use crate::client::Client;
use crate::element::Element;
use crate::error::Error;
use crate::event::message::EventMessage;
use crate::outbox::Outbound;
use crate::ui::Ui;

// ---------------------------------------------------------------------------
// Pilot
// ---------------------------------------------------------------------------

/// A headless app driver for testing.
///
/// Errors reported through the app's exception handlers are collected and can
/// be inspected with [`errors`](Self::errors).
///
/// # Examples
///
/// ```ignore
/// use liveslot::testing::Pilot;
///
/// let pilot = Pilot::new();
/// let button = pilot.ui().element("q-btn")?;
/// button.set_text("Refresh")?;
/// pilot.click(&button);
/// pilot.should_contain("Refresh");
/// ```
pub struct Pilot {
    app: App,
    client: Client,
    errors: Rc<RefCell<Vec<Error>>>,
}

impl Default for Pilot {
    fn default() -> Self {
        Self::new()
    }
}

impl Pilot {
    /// Create an app with one connected client.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// Create a Pilot from an [`AppConfig`].
    pub fn with_config(config: AppConfig) -> Self {
        let app = App::new(config);
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        app.on_exception(move |err| sink.borrow_mut().push(err.clone()));
        let client = app.new_client(false);
        client.connect();
        Self {
            app,
            client,
            errors,
        }
    }

    // ── Access ───────────────────────────────────────────────────────

    /// The underlying app.
    pub fn app(&self) -> &App {
        &self.app
    }

    /// The pilot's client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// A construction context at the client's root.
    pub fn ui(&self) -> Ui {
        self.client.ui()
    }

    /// Errors reported so far.
    pub fn errors(&self) -> Vec<Error> {
        self.errors.borrow().clone()
    }

    /// Forget the reported errors.
    pub fn clear_errors(&self) {
        self.errors.borrow_mut().clear();
    }

    // ── Event simulation ─────────────────────────────────────────────

    /// Deliver a raw event message. Returns how many listeners ran.
    pub fn send(&self, msg: EventMessage) -> usize {
        self.client.handle_event(msg)
    }

    /// Simulate a click on `element`.
    pub fn click(&self, element: &Element) -> usize {
        self.send(EventMessage::new(element.id(), "click"))
    }

    /// Click the first element whose text is exactly `text`.
    ///
    /// Returns how many listeners ran (0 when nothing matches).
    pub fn click_text(&self, text: &str) -> usize {
        let target = self
            .client
            .find_by_text(text)
            .into_iter()
            .find(|element| element.text().is_ok_and(|t| t == text));
        target.map_or(0, |element| self.click(&element))
    }

    // ── Output ───────────────────────────────────────────────────────

    /// Drain the outbox.
    pub fn flush(&self) -> Vec<Outbound> {
        self.app.flush()
    }

    /// Render the client's tree as indented text.
    pub fn render(&self) -> String {
        super::snapshot::tree_to_string(&self.client)
    }

    /// Whether any element's text contains `text`.
    pub fn contains(&self, text: &str) -> bool {
        !self.client.find_by_text(text).is_empty()
    }

    /// Assert that some element's text contains `text`.
    #[track_caller]
    pub fn should_contain(&self, text: &str) {
        assert!(
            self.contains(text),
            "expected to find {text:?} in\n{}",
            self.render()
        );
    }

    /// Assert that no element's text contains `text`.
    #[track_caller]
    pub fn should_not_contain(&self, text: &str) {
        assert!(
            !self.contains(text),
            "did not expect to find {text:?} in\n{}",
            self.render()
        );
    }
}

// ===========================================================================
// Tests
// ===========================================================================
