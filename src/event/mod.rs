//! Event system: listener registry, inbound messages, dispatch.

pub mod handler;
pub mod listener;
pub mod message;

pub use handler::{dispatch, EventArguments};
pub use listener::{EventDescriptor, EventListener, Handler, ListenerSummary, ListenerType};
pub use message::EventMessage;
