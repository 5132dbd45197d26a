//! Child-window queries: order-by-child, equal-to, limit-to-last.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::path::TreePath;
use crate::tree;

/// An ordered list of `(key, value)` children, as produced by a query.
pub type Window = Vec<(String, Value)>;

/// A read over the direct children of one tree location.
///
/// With no clauses the window is every child in key order. `order_by_child`
/// re-sorts by the value under a relative path inside each child, `equal_to`
/// keeps only children whose sort value matches, and `limit_to_last` trims
/// the window to its tail while keeping ascending order.
#[derive(Debug, Clone)]
pub struct TreeQuery {
    path: TreePath,
    order_by_child: Option<String>,
    equal_to: Option<Value>,
    limit_to_last: Option<usize>,
}

impl TreeQuery {
    pub fn at(path: TreePath) -> Self {
        Self {
            path,
            order_by_child: None,
            equal_to: None,
            limit_to_last: None,
        }
    }

    pub fn order_by_child(mut self, child: &str) -> Self {
        self.order_by_child = Some(child.to_string());
        self
    }

    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    pub fn limit_to_last(mut self, count: usize) -> Self {
        self.limit_to_last = Some(count);
        self
    }

    pub fn path(&self) -> &TreePath {
        &self.path
    }

    /// Validate the clauses once, before the query is registered or run.
    pub(crate) fn compile(self) -> StoreResult<CompiledQuery> {
        let order_by_child = match self.order_by_child {
            Some(raw) => {
                let rel = TreePath::parse(&raw)?;
                if rel.is_root() {
                    return Err(StoreError::InvalidQuery(format!(
                        "empty order-by-child path {raw:?}"
                    )));
                }
                Some(rel)
            }
            None => None,
        };
        if self.equal_to.is_some() && order_by_child.is_none() {
            return Err(StoreError::InvalidQuery(
                "equal-to requires order-by-child".into(),
            ));
        }
        if self.limit_to_last == Some(0) {
            return Err(StoreError::InvalidQuery(
                "limit-to-last of zero".into(),
            ));
        }
        Ok(CompiledQuery {
            path: self.path,
            order_by_child,
            equal_to: self.equal_to,
            limit_to_last: self.limit_to_last,
        })
    }
}

/// A validated query, ready to run against tree snapshots.
#[derive(Debug, Clone)]
pub(crate) struct CompiledQuery {
    path: TreePath,
    order_by_child: Option<TreePath>,
    equal_to: Option<Value>,
    limit_to_last: Option<usize>,
}

impl CompiledQuery {
    pub(crate) fn path(&self) -> &TreePath {
        &self.path
    }

    /// Compute the current window, in ascending order.
    ///
    /// A missing or non-object node at the query path yields an empty
    /// window; leaves have no children to enumerate.
    pub(crate) fn evaluate(&self, root: &Value) -> Window {
        let Some(Value::Object(children)) = tree::get_at(root, &self.path) else {
            return Vec::new();
        };
        let mut window: Window = children
            .iter()
            .filter(|(_, child)| match &self.equal_to {
                Some(wanted) => {
                    compare_values(self.sort_value(child), Some(wanted)) == Ordering::Equal
                }
                None => true,
            })
            .map(|(key, child)| (key.clone(), child.clone()))
            .collect();
        if self.order_by_child.is_some() {
            // Map iteration is key-ordered, so a stable sort on the child
            // value keeps key order as the tiebreak.
            window.sort_by(|(_, a), (_, b)| {
                compare_values(self.sort_value(a), self.sort_value(b))
            });
        }
        if let Some(limit) = self.limit_to_last
            && window.len() > limit
        {
            window.drain(..window.len() - limit);
        }
        window
    }

    fn sort_value<'a>(&self, child: &'a Value) -> Option<&'a Value> {
        let rel = self.order_by_child.as_ref()?;
        tree::get_at(child, rel)
    }
}

/// Cross-type ordering used by ordered reads: absent first, then booleans,
/// numbers, strings, and finally container values.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or(f64::NAN)
            .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => Ordering::Equal,
    })
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(false)) => 1,
        Some(Value::Bool(true)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_) | Value::Object(_)) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compiled(query: TreeQuery) -> CompiledQuery {
        query.compile().unwrap()
    }

    fn keys(window: &[(String, Value)]) -> Vec<&str> {
        window.iter().map(|(key, _)| key.as_str()).collect()
    }

    #[test]
    fn test_plain_window_is_key_ordered() {
        let root = json!({ "items": { "b": 2, "a": 1, "c": 3 } });
        let query = compiled(TreeQuery::at(TreePath::parse("items").unwrap()));
        assert_eq!(keys(&query.evaluate(&root)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_or_leaf_node_yields_empty_window() {
        let root = json!({ "items": 7 });
        let query = compiled(TreeQuery::at(TreePath::parse("items").unwrap()));
        assert!(query.evaluate(&root).is_empty());
        let query = compiled(TreeQuery::at(TreePath::parse("nothing").unwrap()));
        assert!(query.evaluate(&root).is_empty());
    }

    #[test]
    fn test_order_by_child_sorts_and_breaks_ties_by_key() {
        let root = json!({
            "chats": {
                "x": { "createdAt": 30 },
                "y": { "createdAt": 10 },
                "z": { "createdAt": 30 },
            }
        });
        let query = compiled(
            TreeQuery::at(TreePath::parse("chats").unwrap()).order_by_child("createdAt"),
        );
        assert_eq!(keys(&query.evaluate(&root)), vec!["y", "x", "z"]);
    }

    #[test]
    fn test_cross_type_ranking() {
        let root = json!({
            "n": {
                "str": { "v": "abc" },
                "absent": {},
                "yes": { "v": true },
                "no": { "v": false },
                "num": { "v": 5 },
            }
        });
        let query =
            compiled(TreeQuery::at(TreePath::parse("n").unwrap()).order_by_child("v"));
        assert_eq!(
            keys(&query.evaluate(&root)),
            vec!["absent", "no", "yes", "num", "str"]
        );
    }

    #[test]
    fn test_equal_to_filters_on_sort_value() {
        let root = json!({
            "chats": {
                "a": { "participants": { "u1": true } },
                "b": { "participants": { "u2": true } },
                "c": { "participants": { "u1": true, "u2": true } },
            }
        });
        let query = compiled(
            TreeQuery::at(TreePath::parse("chats").unwrap())
                .order_by_child("participants/u1")
                .equal_to(true),
        );
        assert_eq!(keys(&query.evaluate(&root)), vec!["a", "c"]);
    }

    #[test]
    fn test_limit_to_last_keeps_the_tail_ascending() {
        let root = json!({
            "messages": {
                "m1": { "timestamp": 1 },
                "m2": { "timestamp": 2 },
                "m3": { "timestamp": 3 },
                "m4": { "timestamp": 4 },
            }
        });
        let query = compiled(
            TreeQuery::at(TreePath::parse("messages").unwrap()).limit_to_last(2),
        );
        assert_eq!(keys(&query.evaluate(&root)), vec!["m3", "m4"]);
    }

    #[test]
    fn test_compile_rejects_bad_clauses() {
        let at = || TreeQuery::at(TreePath::parse("x").unwrap());
        assert!(matches!(
            at().equal_to(true).compile(),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            at().order_by_child("").compile(),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            at().limit_to_last(0).compile(),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            at().order_by_child("bad.path").compile(),
            Err(StoreError::InvalidPath(_))
        ));
    }
}
