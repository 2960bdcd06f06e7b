//! Patch application.
//!
//! [`apply`] runs operations in order against any [`PatchTarget`] and stops
//! at the first one that does not apply. Malformed operations never get this
//! far: they are rejected while parsing.

use serde_json::Value;
use tracing::debug;

use super::ops::{parse_patches, PatchOp};
use super::path::Path;
use crate::error::Result;

/// A document that patch operations can be applied to.
///
/// Implementors only provide the three primitive edits. `replace`, `move`,
/// `copy` and `test` are composed from them by [`apply`].
pub trait PatchTarget {
    /// The value at `path`, if the path resolves.
    fn read(&self, path: &Path) -> Option<Value>;

    /// Insert `value` at `path`. Returns `false` if the parent does not
    /// resolve or the final segment is not valid for the parent container.
    fn add(&mut self, path: &Path, value: Value) -> bool;

    /// Remove the value at `path` and hand it back. `None` means the
    /// operation did not apply.
    fn remove(&mut self, path: &Path) -> Option<Value>;
}

/// Apply `ops` in order. Returns `false` on the first operation that
/// reports failure; operations before it stay applied.
pub fn apply<T: PatchTarget + ?Sized>(target: &mut T, ops: &[PatchOp]) -> bool {
    for (index, op) in ops.iter().enumerate() {
        if !apply_op(target, op) {
            debug!(index, op = op.name(), path = %op.path(), "patch did not apply");
            return false;
        }
    }
    true
}

/// Validate a raw JSON patch document, then apply it.
pub fn apply_json<T: PatchTarget + ?Sized>(target: &mut T, raw: &Value) -> Result<bool> {
    let ops = parse_patches(raw)?;
    Ok(apply(target, &ops))
}

pub fn apply_op<T: PatchTarget + ?Sized>(target: &mut T, op: &PatchOp) -> bool {
    match op {
        PatchOp::Add { path, value } => target.add(path, value.clone()),
        PatchOp::Remove { path } => target.remove(path).is_some(),
        PatchOp::Replace { path, value } => {
            if target.read(path).is_none() {
                return false;
            }
            target.remove(path).is_some() && target.add(path, value.clone())
        }
        PatchOp::Move { from, path } => {
            if from == path {
                return target.read(from).is_some();
            }
            // A location cannot be moved into one of its own children.
            if path.segments().starts_with(from.segments()) {
                return false;
            }
            match target.remove(from) {
                Some(value) => target.add(path, value),
                None => false,
            }
        }
        PatchOp::Copy { from, path } => match target.read(from) {
            Some(value) => target.add(path, value),
            None => false,
        },
        PatchOp::Test { path, value } => target.read(path).as_ref() == Some(value),
    }
}

/// Parse an array index segment. `-` is only meaningful for `add` and is
/// handled by the caller.
pub(crate) fn array_index(segment: &str) -> Option<usize> {
    if segment.len() > 1 && segment.starts_with('0') {
        return None;
    }
    segment.parse().ok()
}

pub(crate) fn read_at<'a>(doc: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments.iter().try_fold(doc, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => array_index(segment).and_then(|i| items.get(i)),
        _ => None,
    })
}

fn parent_mut<'a>(doc: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    segments.iter().try_fold(doc, |node, segment| match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => array_index(segment).and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

pub(crate) fn add_at(doc: &mut Value, segments: &[String], value: Value) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        *doc = value;
        return true;
    };
    match parent_mut(doc, parents) {
        Some(Value::Object(map)) => {
            map.insert(last.clone(), value);
            true
        }
        Some(Value::Array(items)) => {
            if last == "-" {
                items.push(value);
                return true;
            }
            match array_index(last) {
                Some(index) if index <= items.len() => {
                    items.insert(index, value);
                    true
                }
                _ => false,
            }
        }
        _ => false,
    }
}

pub(crate) fn remove_at(doc: &mut Value, segments: &[String]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    match parent_mut(doc, parents)? {
        Value::Object(map) => map.remove(last),
        Value::Array(items) => match array_index(last) {
            Some(index) if index < items.len() => Some(items.remove(index)),
            _ => None,
        },
        _ => None,
    }
}

impl PatchTarget for Value {
    fn read(&self, path: &Path) -> Option<Value> {
        read_at(self, path.segments()).cloned()
    }

    fn add(&mut self, path: &Path, value: Value) -> bool {
        add_at(self, path.segments(), value)
    }

    fn remove(&mut self, path: &Path) -> Option<Value> {
        remove_at(self, path.segments())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_into_object() {
        let mut doc = json!({"a": {"b": {}}});
        assert!(apply(&mut doc, &[PatchOp::add(["a", "b", "c"], "test")]));
        assert_eq!(doc, json!({"a": {"b": {"c": "test"}}}));
    }

    #[test]
    fn add_then_remove_restores_document() {
        let mut doc = json!({"a": {}});
        assert!(apply(&mut doc, &[PatchOp::add(["a", "b"], 1)]));
        assert_eq!(doc, json!({"a": {"b": 1}}));
        assert!(apply(&mut doc, &[PatchOp::remove(["a", "b"])]));
        assert_eq!(doc, json!({"a": {}}));
    }

    #[test]
    fn add_into_array() {
        let mut doc = json!({"a": {"b": {"c": [1, 3]}}});
        assert!(apply(&mut doc, &[PatchOp::add(["a", "b", "c", "1"], 2)]));
        assert_eq!(doc, json!({"a": {"b": {"c": [1, 2, 3]}}}));

        assert!(!apply(&mut doc, &[PatchOp::add(["a", "b", "c", "d"], 3)]));
        assert!(!apply(&mut doc, &[PatchOp::add(["a", "b", "c", "9"], 3)]));

        assert!(apply(&mut doc, &[PatchOp::add(["a", "b", "c", "-"], 4)]));
        assert_eq!(doc, json!({"a": {"b": {"c": [1, 2, 3, 4]}}}));
    }

    #[test]
    fn remove_from_array() {
        let mut doc = json!({"a": {"b": {"c": [1, 2, 3]}}});
        assert!(apply(&mut doc, &[PatchOp::remove(["a", "b", "c", "1"])]));
        assert_eq!(doc, json!({"a": {"b": {"c": [1, 3]}}}));
        assert!(!apply(&mut doc, &[PatchOp::remove(["a", "b", "c", "d"])]));
    }

    #[test]
    fn unresolvable_parent_soft_fails() {
        let mut doc = json!({"a": 1});
        assert!(!apply(&mut doc, &[PatchOp::add(["x", "y"], 1)]));
        assert!(!apply(&mut doc, &[PatchOp::remove(["missing"])]));
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn replace_requires_existing_target() {
        let mut doc = json!({"a": {"b": {"c": "test"}}});
        assert!(apply(&mut doc, &[PatchOp::replace(["a", "b", "c"], "test1")]));
        assert_eq!(doc, json!({"a": {"b": {"c": "test1"}}}));
        assert!(!apply(&mut doc, &[PatchOp::replace(["a", "b", "z"], 1)]));

        let mut list = json!([1, 2, 3]);
        assert!(apply(&mut list, &[PatchOp::replace(["1"], 9)]));
        assert_eq!(list, json!([1, 9, 3]));
    }

    #[test]
    fn move_and_inverse_move_restore_original() {
        let original = json!({"a": {"b": {"c": "test"}}});
        let mut doc = original.clone();
        assert!(apply(&mut doc, &[PatchOp::move_from(["a", "b", "c"], ["a", "b", "d"])]));
        assert_eq!(doc, json!({"a": {"b": {"d": "test"}}}));
        assert!(apply(&mut doc, &[PatchOp::move_from(["a", "b", "d"], ["a", "b", "c"])]));
        assert_eq!(doc, original);
    }

    #[test]
    fn move_into_own_child_is_rejected() {
        let mut doc = json!({"a": {"b": 1}});
        assert!(!apply(&mut doc, &[PatchOp::move_from(["a"], ["a", "c"])]));
        assert_eq!(doc, json!({"a": {"b": 1}}));
    }

    #[test]
    fn copy_leaves_source_untouched() {
        let mut doc = json!({"a": {"b": {"c": "test"}}});
        assert!(apply(&mut doc, &[PatchOp::copy_from(["a", "b", "c"], ["a", "b", "d"])]));
        assert_eq!(doc, json!({"a": {"b": {"c": "test", "d": "test"}}}));
    }

    #[test]
    fn test_compares_structurally() {
        let mut doc = json!({
            "a": {"b": {
                "c": "test",
                "d": ["1", "2", "3"],
                "e": {},
                "f": {"g": {"h": "test"}}
            }}
        });
        assert!(apply(&mut doc, &[PatchOp::test(["a", "b", "c"], "test")]));
        assert!(!apply(&mut doc, &[PatchOp::test(["a", "b", "c"], "test1")]));
        assert!(apply(&mut doc, &[PatchOp::test(["a", "b", "d"], json!(["1", "2", "3"]))]));
        assert!(!apply(&mut doc, &[PatchOp::test(["a", "b", "d"], json!(["1", "2"]))]));
        assert!(!apply(&mut doc, &[PatchOp::test(["a", "b", "d"], json!(["1", "2", "4"]))]));
        assert!(!apply(&mut doc, &[PatchOp::test(["a", "b", "d"], 0)]));
        assert!(apply(&mut doc, &[PatchOp::test(["a", "b", "e"], json!({}))]));
        assert!(!apply(&mut doc, &[PatchOp::test(["a", "b", "e"], json!({"boom": true}))]));
        assert!(apply(&mut doc, &[PatchOp::test(["a", "b", "f"], json!({"g": {"h": "test"}}))]));
        assert!(!apply(&mut doc, &[PatchOp::test(["a", "b", "f"], json!({"g": {"h": "boom"}}))]));
    }

    #[test]
    fn apply_short_circuits_on_first_failure() {
        let mut doc = json!({});
        let ops = [
            PatchOp::add(["a"], 1),
            PatchOp::test(["a"], 2),
            PatchOp::add(["b"], 2),
        ];
        assert!(!apply(&mut doc, &ops));
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn apply_json_rejects_malformed_before_applying() {
        let mut doc = json!({});
        let raw = json!([{"op": "add", "path": "/a", "value": 1}, {"op": "woops"}]);
        assert!(apply_json(&mut doc, &raw).is_err());
        assert_eq!(doc, json!({}));

        let raw = json!([{"op": "add", "path": "/a", "value": 1}]);
        assert!(apply_json(&mut doc, &raw).unwrap());
        assert_eq!(doc, json!({"a": 1}));
    }
}
