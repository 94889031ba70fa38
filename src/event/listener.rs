//! Event listeners: listener-type tokenizer and the client-facing descriptor.
//!
//! A listener type such as `keydown.enter.stop` is split on `.` into a base
//! event name and modifier tokens. Tokens fall into three disjoint classes:
//! specials (`capture`, `once`, `passive`), modifiers (`stop`, `prevent`,
//! `self`, `ctrl`, `shift`, `alt`, `meta`) and everything else, which is
//! treated as a key filter.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

use super::handler::EventArguments;
use crate::error::Result;

const SPECIALS: &[&str] = &["capture", "once", "passive"];
const MODIFIERS: &[&str] = &["stop", "prevent", "self", "ctrl", "shift", "alt", "meta"];

// ---------------------------------------------------------------------------
// ListenerType
// ---------------------------------------------------------------------------

/// A parsed listener type: `{base, specials, modifiers, keys}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerType {
    /// Base event name, e.g. `keydown`.
    pub base: String,
    /// `capture` / `once` / `passive` tokens, in source order.
    pub specials: Vec<String>,
    /// `stop` / `prevent` / `self` / `ctrl` / `shift` / `alt` / `meta` tokens.
    pub modifiers: Vec<String>,
    /// Remaining tokens, used as key filters.
    pub keys: Vec<String>,
}

impl ListenerType {
    /// Tokenize `keydown.enter.stop` style listener types.
    pub fn parse(ty: &str) -> Self {
        let mut words = ty.split('.');
        let base = words.next().unwrap_or_default().to_owned();
        let mut parsed = Self {
            base,
            specials: Vec::new(),
            modifiers: Vec::new(),
            keys: Vec::new(),
        };
        for word in words.filter(|w| !w.is_empty()) {
            let bucket = if SPECIALS.contains(&word) {
                &mut parsed.specials
            } else if MODIFIERS.contains(&word) {
                &mut parsed.modifiers
            } else {
                &mut parsed.keys
            };
            bucket.push(word.to_owned());
        }
        parsed
    }
}

// ---------------------------------------------------------------------------
// EventListener
// ---------------------------------------------------------------------------

/// Handler invoked for a matching inbound event.
pub type Handler = Rc<dyn Fn(&EventArguments) -> Result<()>>;

/// A single `(type, args, throttle, handler)` binding on an element.
#[derive(Clone)]
pub struct EventListener {
    /// The full listener type string, e.g. `keydown.enter.stop`.
    pub ty: String,
    /// Argument names the browser should report; `*` means all.
    pub args: Vec<String>,
    /// Minimum time between two reports of this event.
    pub throttle: Duration,
    /// The callback.
    pub handler: Handler,
}

impl EventListener {
    /// Create a listener reporting all arguments without throttling.
    pub fn new(ty: impl Into<String>, handler: Handler) -> Self {
        Self {
            ty: ty.into(),
            args: vec!["*".to_owned()],
            throttle: Duration::ZERO,
            handler,
        }
    }

    /// Restrict the reported arguments (builder).
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the throttle interval (builder).
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("ty", &self.ty)
            .field("args", &self.args)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Client-facing descriptor
// ---------------------------------------------------------------------------

/// What the browser needs to attach one listener type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDescriptor {
    pub listener_type: String,
    #[serde(rename = "type")]
    pub base: String,
    pub specials: Vec<String>,
    pub modifiers: Vec<String>,
    pub keys: Vec<String>,
    /// Sorted union of every requested argument name.
    pub args: BTreeSet<String>,
    /// Minimum throttle in seconds.
    pub throttle: f64,
}

/// Build the per-listener-type descriptor map for a list of listeners.
///
/// Listeners sharing a type string are merged: their argument lists are
/// unioned and the smallest throttle wins.
pub fn describe(listeners: &[EventListener]) -> IndexMap<String, EventDescriptor> {
    let mut events: IndexMap<String, EventDescriptor> = IndexMap::new();
    for listener in listeners {
        let descriptor = events.entry(listener.ty.clone()).or_insert_with(|| {
            let parsed = ListenerType::parse(&listener.ty);
            EventDescriptor {
                listener_type: listener.ty.clone(),
                base: parsed.base,
                specials: parsed.specials,
                modifiers: parsed.modifiers,
                keys: parsed.keys,
                args: BTreeSet::new(),
                throttle: f64::INFINITY,
            }
        });
        descriptor.args.extend(listener.args.iter().cloned());
        descriptor.throttle = descriptor.throttle.min(listener.throttle.as_secs_f64());
    }
    events
}

/// Merged advertisement of all listener types sharing one base event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListenerSummary {
    pub specials: BTreeSet<String>,
    pub modifiers: BTreeSet<String>,
    pub keys: BTreeSet<String>,
    pub args: BTreeSet<String>,
    pub throttle: Option<Duration>,
}

/// Merge every listener whose base event is `base`.
///
/// Returns `None` when no listener has that base.
pub fn summarize(listeners: &[EventListener], base: &str) -> Option<ListenerSummary> {
    let mut summary: Option<ListenerSummary> = None;
    for listener in listeners {
        let parsed = ListenerType::parse(&listener.ty);
        if parsed.base != base {
            continue;
        }
        let s = summary.get_or_insert_with(ListenerSummary::default);
        s.specials.extend(parsed.specials);
        s.modifiers.extend(parsed.modifiers);
        s.keys.extend(parsed.keys);
        s.args.extend(listener.args.iter().cloned());
        s.throttle = Some(match s.throttle {
            Some(t) => t.min(listener.throttle),
            None => listener.throttle,
        });
    }
    summary
}
