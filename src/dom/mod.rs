//! Element registry: id-keyed element tree with named slots and queries.

pub mod node;
pub mod query;
pub mod tree;

pub use node::{ElementData, ElementId, Slot, SlotRef, DEFAULT_SLOT};
pub use tree::{ElementTree, RemoveTarget};
