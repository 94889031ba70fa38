//! Inbound event message as sent by the browser.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dom::node::ElementId;

/// `{id, type, args}`: a browser event addressed to one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Target element.
    pub id: ElementId,
    /// Listener type string; must match a registered listener exactly.
    #[serde(rename = "type")]
    pub ty: String,
    /// Per-type payload.
    #[serde(default)]
    pub args: Value,
}

impl EventMessage {
    /// Create a message without arguments.
    pub fn new(id: ElementId, ty: impl Into<String>) -> Self {
        Self {
            id,
            ty: ty.into(),
            args: Value::Null,
        }
    }

    /// Attach a payload (builder).
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_from_wire() {
        let wire = json!({"id": 7, "type": "keydown.enter", "args": {"key": "Enter"}});
        let msg: EventMessage = serde_json::from_value(wire).unwrap();
        assert_eq!(msg.id, ElementId(7));
        assert_eq!(msg.ty, "keydown.enter");
        assert_eq!(msg.args["key"], "Enter");
    }

    #[test]
    fn args_default_to_null() {
        let msg: EventMessage = serde_json::from_value(json!({"id": 1, "type": "click"})).unwrap();
        assert_eq!(msg, EventMessage::new(ElementId(1), "click"));
    }

    #[test]
    fn builder() {
        let msg = EventMessage::new(ElementId(2), "update:model-value").with_args(json!(3));
        assert_eq!(msg.args, json!(3));
    }
}
