//! Crate-wide error type.
//!
//! Errors are grouped the way callers handle them: parse and lookup failures
//! are returned to the programming API, binding errors abort a refresh before
//! any output is touched, and handler/timeout errors are routed through
//! [`App::handle_exception`](crate::app::App::handle_exception).

use std::time::Duration;

use crate::dom::node::ElementId;

/// Errors produced by liveslot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Malformed class/style/prop mini-language input.
    #[error("cannot parse {input:?}: {reason} at {token:?}")]
    Parse {
        input: String,
        token: String,
        reason: String,
    },

    /// Unknown key passed to element serialization.
    #[error("unknown key {0}")]
    UnknownKey(String),

    /// The element is not (or no longer) registered with its client.
    #[error("element {0} does not exist")]
    ElementNotFound(ElementId),

    /// Positional removal past the end of the child list.
    #[error("child index {index} out of range for {len} children")]
    ChildIndexOutOfRange { index: usize, len: usize },

    /// The removal target is not inside the element it is removed from.
    #[error("element {child} is not a descendant of element {parent}")]
    NotADescendant { parent: ElementId, child: ElementId },

    /// The element has no slot with this name.
    #[error("element {element} has no slot named {name:?}")]
    SlotNotFound { element: ElementId, name: String },

    /// Inconsistent positional/keyword arguments for a refreshable function.
    #[error("{message}")]
    Binding { function: String, message: String },

    /// Something did not happen within its time bound.
    #[error("{what} did not happen within {after:?}")]
    Timeout { what: String, after: Duration },

    /// A user-supplied callback failed.
    #[error("handler failed: {0}")]
    Handler(String),

    /// The client no longer belongs to a live application.
    #[error("client {0} is not attached to an application")]
    Detached(u64),

    /// A canceled timer cannot be activated again.
    #[error("cannot activate a canceled timer")]
    TimerCanceled,
}

impl Error {
    /// Shorthand for a parse error.
    pub(crate) fn parse(input: &str, token: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.to_owned(),
            token: token.to_owned(),
            reason: reason.into(),
        }
    }

    /// Build a handler error from anything displayable.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Self::Handler(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
