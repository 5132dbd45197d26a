//! Mutation primitives over the store's backing tree.
//!
//! The whole tree is one `serde_json::Value`. `Null` and the empty object
//! mean "absent": writes are deep-pruned before they land, deletes prune
//! emptied ancestors, and an empty tree collapses back to `Null`. Child
//! iteration order is the map's key order, which for store-minted push ids
//! equals insertion order.

use serde_json::{Map, Value};

use crate::path::TreePath;

/// Read the subtree at `path`. Absent and `Null` are both `None`.
pub(crate) fn get_at<'a>(root: &'a Value, path: &TreePath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment.as_str())?;
    }
    if node.is_null() { None } else { Some(node) }
}

/// Replace the subtree at `path`. Writing `Null` (or a value that prunes to
/// nothing) is a delete. Intermediate nodes are created as needed; a leaf in
/// the way is overwritten, matching write-wins tree-store semantics.
pub(crate) fn set_at(root: &mut Value, path: &TreePath, value: Value) {
    let Some(value) = prune(value) else {
        remove_at(root, path);
        return;
    };
    let mut node = root;
    for segment in path.segments() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = node
            .as_object_mut()
            .expect("just made an object")
            .entry(segment.clone())
            .or_insert(Value::Null);
    }
    *node = value;
}

/// Delete the subtree at `path`, pruning ancestors that become empty.
/// Deleting something absent is a no-op.
pub(crate) fn remove_at(root: &mut Value, path: &TreePath) {
    if path.is_root() {
        *root = Value::Null;
        return;
    }
    if descend_remove(root, path.segments()) {
        *root = Value::Null;
    }
}

/// Returns true when `node` ended up empty and should be dropped by its
/// parent.
fn descend_remove(node: &mut Value, segments: &[String]) -> bool {
    let Value::Object(map) = node else {
        return false;
    };
    let (head, rest) = segments.split_first().expect("non-root path");
    if rest.is_empty() {
        map.remove(head.as_str());
    } else if let Some(child) = map.get_mut(head.as_str())
        && descend_remove(child, rest)
    {
        map.remove(head.as_str());
    }
    map.is_empty()
}

/// Strip `Null` children and empty objects recursively. `None` means the
/// value prunes away entirely.
pub(crate) fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(key, child)| prune(child).map(|child| (key, child)))
                .collect();
            if pruned.is_empty() {
                None
            } else {
                Some(Value::Object(pruned))
            }
        }
        other => Some(other),
    }
}
