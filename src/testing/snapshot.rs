//! Snapshot rendering helpers.
//!
//! Turns a client's element tree into indented plain text, suitable for
//! `insta` snapshots and `contains` assertions.

use std::fmt::Write;

use crate::client::Client;
use crate::dom::node::{ElementId, DEFAULT_SLOT};
use crate::dom::tree::ElementTree;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Render the client's whole tree, starting at its root.
///
/// One element per line, two spaces of indentation per level:
///
/// ```text
/// body
///   q-card .w-full
///     label "text=A"
/// ```
///
/// Element ids are left out so snapshots survive refreshes. Children of a
/// named slot are prefixed with `#name:`.
pub fn tree_to_string(client: &Client) -> String {
    client.with_tree(|tree| subtree_to_string(tree, client.root().id()))
}

/// Render the subtree below (and including) `id`.
///
/// Unknown ids render as an empty string.
pub fn subtree_to_string(tree: &ElementTree, id: ElementId) -> String {
    let mut out = String::new();
    write_element(tree, id, 0, None, &mut out);
    // Drop the final newline.
    out.pop();
    out
}

fn write_element(
    tree: &ElementTree,
    id: ElementId,
    depth: usize,
    slot: Option<&str>,
    out: &mut String,
) {
    let Ok(data) = tree.get(id) else {
        return;
    };
    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    if let Some(slot) = slot {
        let _ = write!(out, "#{slot}: ");
    }
    out.push_str(&data.tag);
    if !data.classes.is_empty() {
        let _ = write!(out, " .{}", data.classes.join("."));
    }
    if !data.props.is_empty() {
        let _ = write!(out, " [{}]", crate::css::props_to_string(&data.props));
    }
    if !data.text.is_empty() {
        let _ = write!(out, " {:?}", data.text);
    }
    out.push('\n');

    for (name, slot) in &data.slots {
        let label = (name != DEFAULT_SLOT).then_some(name.as_str());
        for child in &slot.children {
            write_element(tree, *child, depth + 1, label, out);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
