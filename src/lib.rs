//! # liveslot
//!
//! A server-driven UI core: application code builds a tree of stateful
//! elements on the server, and liveslot mirrors that tree to a browser,
//! routes browser events back to server-side callbacks and rebuilds parts of
//! the tree in place on demand.
//!
//! ## Core Systems
//!
//! - **[`dom`]** — Identity registry and element tree with named slots
//! - **[`css`]** — Class, style and prop mini-languages (logos tokenizer)
//! - **[`outbox`]** — Outbound update queue with per-element coalescing
//! - **[`event`]** — Listener registry, listener-type parsing, dispatch
//! - **[`reactive`]** — Refreshable UI functions and argument binding
//! - **[`timer`]** — Periodic and one-shot callbacks bound to a slot
//! - **[`app`]** — Process context: clients, lifecycle, exception reporting
//! - **[`client`]** — One browser connection and its tree
//! - **[`element`]** / **[`ui`]** — Element handles and the construction context
//! - **[`testing`]** — Headless Pilot and text snapshots
//!
//! ## Example
//!
//! ```ignore
//! use liveslot::{App, AppConfig, Arguments, Refreshable};
//!
//! let app = App::new(AppConfig::default());
//! let client = app.new_client(false);
//! let ui = client.ui();
//!
//! let card = ui.element("q-card")?;
//! let view = Refreshable::new("label_ui", &["text"], |ui, args| {
//!     let text: String = args.decode("text")?;
//!     ui.element("label")?.set_text(&text)?;
//!     Ok(())
//! });
//! ui.within(&card, |ui| view.call(ui, Arguments::new().arg("text=A")))?;
//! view.refresh(Arguments::new().arg("text=B"))?;
//!
//! for message in app.flush() {
//!     // hand `message` to the transport
//! }
//! ```

// Foundation
pub mod error;

// Core systems
pub mod css;
pub mod dom;
pub mod event;
pub mod outbox;

// Handles
pub mod client;
pub mod element;
pub mod ui;

// Refresh and scheduling
pub mod reactive;
pub mod timer;

// Application
pub mod app;

// Testing
pub mod testing;

pub use app::{App, AppConfig, LifecycleState};
pub use client::{Client, ClientId, ConnectionState};
pub use css::Change;
pub use dom::{ElementId, RemoveTarget, SlotRef};
pub use element::Element;
pub use error::{Error, Result};
pub use event::{EventArguments, EventListener, EventMessage};
pub use outbox::{Outbound, Target};
pub use reactive::{Arguments, AsyncRefreshable, BoundArguments, Refreshable};
pub use timer::{Timer, TimerPhase};
pub use ui::{SlotGuard, Ui};
