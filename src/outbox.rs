//! Outbound update queue.
//!
//! [`Outbox`] buffers "this element changed" notifications and arbitrary
//! messages (such as `run_method`) per target until the transport flushes
//! them. Updates for the same element coalesce into one; messages never do.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::client::ClientId;
use crate::dom::node::ElementId;

/// Message kind for coalesced element updates.
pub const UPDATE: &str = "update";
/// Message kind for remote method invocations.
pub const RUN_METHOD: &str = "run_method";

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Where an outbound message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// One client connection.
    Client(ClientId),
    /// Every connected client.
    Broadcast,
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// Everything pending for one target.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Batch {
    /// Elements with pending updates, in first-enqueue order.
    pub updates: Vec<ElementId>,
    /// `(kind, payload)` messages in enqueue order.
    pub messages: Vec<(String, Value)>,
    seen: HashSet<ElementId>,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.messages.is_empty()
    }
}

/// One message ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outbound {
    pub target: Target,
    pub kind: String,
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Per-process outbound buffer keyed by target.
///
/// Targets are kept in the order they were first touched so a flush is
/// deterministic.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: IndexMap<Target, Batch>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an element as changed. Repeated calls before a flush coalesce.
    pub fn enqueue_update(&mut self, client: ClientId, element: ElementId) {
        let batch = self.pending.entry(Target::Client(client)).or_default();
        if batch.seen.insert(element) {
            batch.updates.push(element);
        }
    }

    /// Queue a message. Messages are delivered in order and never coalesced.
    pub fn enqueue_message(&mut self, kind: impl Into<String>, payload: Value, target: Target) {
        self.pending
            .entry(target)
            .or_default()
            .messages
            .push((kind.into(), payload));
    }

    /// Number of distinct elements with pending updates for `client`.
    pub fn pending_updates(&self, client: ClientId) -> usize {
        self.pending
            .get(&Target::Client(client))
            .map_or(0, |batch| batch.updates.len())
    }

    /// Number of pending messages for `target`.
    pub fn pending_messages(&self, target: Target) -> usize {
        self.pending.get(&target).map_or(0, |batch| batch.messages.len())
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.values().all(Batch::is_empty)
    }

    /// Drop everything pending for a client that no longer exists.
    pub fn forget(&mut self, client: ClientId) {
        self.pending.shift_remove(&Target::Client(client));
    }

    /// Take all pending batches, leaving the outbox empty.
    pub fn drain(&mut self) -> Vec<(Target, Batch)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .filter(|(_, batch)| !batch.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const A: ClientId = ClientId(1);
    const B: ClientId = ClientId(2);

    // ── Updates ──────────────────────────────────────────────────────

    #[test]
    fn updates_coalesce_per_element() {
        let mut outbox = Outbox::new();
        outbox.enqueue_update(A, ElementId(3));
        outbox.enqueue_update(A, ElementId(4));
        outbox.enqueue_update(A, ElementId(3));
        assert_eq!(outbox.pending_updates(A), 2);

        let drained = outbox.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1.updates, vec![ElementId(3), ElementId(4)]);
    }

    #[test]
    fn updates_are_kept_per_client() {
        let mut outbox = Outbox::new();
        outbox.enqueue_update(A, ElementId(0));
        outbox.enqueue_update(B, ElementId(0));
        assert_eq!(outbox.pending_updates(A), 1);
        assert_eq!(outbox.pending_updates(B), 1);
        let targets: Vec<_> = outbox.drain().into_iter().map(|(t, _)| t).collect();
        assert_eq!(targets, vec![Target::Client(A), Target::Client(B)]);
    }

    // ── Messages ─────────────────────────────────────────────────────

    #[test]
    fn run_method_is_never_coalesced() {
        let mut outbox = Outbox::new();
        for n in 0..3 {
            outbox.enqueue_message(
                RUN_METHOD,
                json!({"id": 5, "name": "focus", "args": [n]}),
                Target::Client(A),
            );
        }
        assert_eq!(outbox.pending_messages(Target::Client(A)), 3);
        let (_, batch) = outbox.drain().remove(0);
        let args: Vec<_> = batch.messages.iter().map(|(_, p)| p["args"][0].clone()).collect();
        assert_eq!(args, vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn broadcast_target() {
        let mut outbox = Outbox::new();
        outbox.enqueue_message("notify", json!("hi"), Target::Broadcast);
        assert_eq!(outbox.pending_messages(Target::Broadcast), 1);
        assert_eq!(outbox.pending_messages(Target::Client(A)), 0);
    }

    // ── Drain ────────────────────────────────────────────────────────

    #[test]
    fn drain_is_idempotent() {
        let mut outbox = Outbox::new();
        outbox.enqueue_update(A, ElementId(1));
        assert_eq!(outbox.drain().len(), 1);
        assert!(outbox.is_empty());
        assert!(outbox.drain().is_empty());
    }

    #[test]
    fn updates_after_drain_are_new() {
        let mut outbox = Outbox::new();
        outbox.enqueue_update(A, ElementId(1));
        outbox.drain();
        outbox.enqueue_update(A, ElementId(1));
        assert_eq!(outbox.pending_updates(A), 1);
    }

    #[test]
    fn forget_drops_client() {
        let mut outbox = Outbox::new();
        outbox.enqueue_update(A, ElementId(1));
        outbox.enqueue_update(B, ElementId(1));
        outbox.forget(A);
        assert_eq!(outbox.pending_updates(A), 0);
        assert_eq!(outbox.drain().len(), 1);
    }
}
