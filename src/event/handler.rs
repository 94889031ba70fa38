//! Event dispatch: resolve an inbound message to listeners and run them.
//!
//! Dispatch never fails. A message for an unknown element is dropped (the
//! browser may hold stale state), and a failing handler is reported through
//! [`App::handle_exception`](crate::app::App::handle_exception) without
//! stopping the remaining listeners.

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use super::message::EventMessage;
use crate::client::Client;
use crate::element::Element;
use crate::error::Error;

// ---------------------------------------------------------------------------
// EventArguments
// ---------------------------------------------------------------------------

/// What a handler receives.
#[derive(Clone)]
pub struct EventArguments {
    /// The element the event was addressed to.
    pub sender: Element,
    /// The listener type string that matched.
    pub ty: String,
    /// Raw payload reported by the browser.
    pub args: Value,
}

impl EventArguments {
    /// The client the event came from.
    pub fn client(&self) -> &Client {
        self.sender.client()
    }

    /// Decode the payload into a concrete type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(self.args.clone()).map_err(Error::handler)
    }
}

impl std::fmt::Debug for EventArguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventArguments")
            .field("sender", &self.sender.id())
            .field("ty", &self.ty)
            .field("args", &self.args)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Deliver `msg` to every listener of its target whose type matches exactly.
///
/// Returns the number of listeners invoked (including failed ones).
pub fn dispatch(client: &Client, msg: EventMessage) -> usize {
    let Some(sender) = client.element(msg.id) else {
        tracing::debug!(
            client = %client.id(),
            element = %msg.id,
            ty = %msg.ty,
            "dropping event for unknown element"
        );
        return 0;
    };
    // Listeners are cloned out so handlers can mutate the tree freely.
    let listeners = match client.with_tree(|tree| tree.listeners_for(msg.id, &msg.ty)) {
        Ok(listeners) => listeners,
        Err(_) => return 0,
    };
    let arguments = EventArguments {
        sender,
        ty: msg.ty,
        args: msg.args,
    };
    for listener in &listeners {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (listener.handler)(&arguments)))
            .unwrap_or_else(|payload| Err(Error::Handler(panic_message(payload.as_ref()))));
        if let Err(err) = outcome {
            client.report(&err);
        }
    }
    listeners.len()
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_owned()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{App, AppConfig};
    use crate::dom::node::ElementId;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (App, Client, Element) {
        let app = App::new(AppConfig::default());
        let client = app.new_client(false);
        let button = client.ui().element("q-btn").unwrap();
        (app, client, button)
    }

    fn capture_errors(app: &App) -> Rc<RefCell<Vec<Error>>> {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        app.on_exception(move |err: &Error| sink.borrow_mut().push(err.clone()));
        errors
    }

    // ── Routing ──────────────────────────────────────────────────────

    #[test]
    fn matching_listeners_run_in_order() {
        let (_app, client, button) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["first", "second"] {
            let log = log.clone();
            button
                .on("click", move |_: &EventArguments| {
                    log.borrow_mut().push(name);
                    Ok(())
                })
                .unwrap();
        }
        let invoked = dispatch(&client, EventMessage::new(button.id(), "click"));
        assert_eq!(invoked, 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn type_must_match_exactly() {
        let (_app, client, button) = setup();
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        button
            .on("keydown.enter", move |_: &EventArguments| {
                *h.borrow_mut() += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(dispatch(&client, EventMessage::new(button.id(), "keydown")), 0);
        assert_eq!(dispatch(&client, EventMessage::new(button.id(), "keydown.enter")), 1);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn payload_reaches_handler() {
        let (_app, client, button) = setup();
        let seen = Rc::new(RefCell::new(None));
        let s = seen.clone();
        button
            .on("click", move |e: &EventArguments| {
                *s.borrow_mut() = Some((e.ty.clone(), e.decode::<i64>()?));
                Ok(())
            })
            .unwrap();
        dispatch(&client, EventMessage::new(button.id(), "click").with_args(json!(42)));
        assert_eq!(*seen.borrow(), Some(("click".to_string(), 42)));
    }

    #[test]
    fn unknown_element_is_ignored() {
        let (app, client, _) = setup();
        let errors = capture_errors(&app);
        assert_eq!(dispatch(&client, EventMessage::new(ElementId(999), "click")), 0);
        assert!(errors.borrow().is_empty());
    }

    // ── Isolation ────────────────────────────────────────────────────

    #[test]
    fn failing_handler_does_not_block_others() {
        let (app, client, button) = setup();
        let errors = capture_errors(&app);
        let ran = Rc::new(RefCell::new(false));
        button
            .on("click", |_: &EventArguments| Err(Error::handler("boom")))
            .unwrap();
        button
            .on("click", |_: &EventArguments| -> crate::Result<()> { panic!("kaboom") })
            .unwrap();
        let r = ran.clone();
        button
            .on("click", move |_: &EventArguments| {
                *r.borrow_mut() = true;
                Ok(())
            })
            .unwrap();

        assert_eq!(dispatch(&client, EventMessage::new(button.id(), "click")), 3);
        assert!(*ran.borrow());
        assert_eq!(
            *errors.borrow(),
            vec![Error::Handler("boom".into()), Error::Handler("kaboom".into())]
        );
    }

    #[test]
    fn handler_may_mutate_tree() {
        let (_app, client, button) = setup();
        button
            .on("click", |e: &EventArguments| {
                e.sender.set_text("clicked")?;
                e.sender.classes("active")?;
                Ok(())
            })
            .unwrap();
        dispatch(&client, EventMessage::new(button.id(), "click"));
        assert_eq!(button.text().unwrap(), "clicked");
    }
}
