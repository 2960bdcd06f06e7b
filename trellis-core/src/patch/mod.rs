//! JSON Patch
//!
//! This module implements RFC 6902 patch documents over RFC 6901 paths.
//!
//! # Overview
//!
//! A patch is an ordered list of [`PatchOp`]s. Applying it walks every
//! operation in turn against a [`PatchTarget`]:
//!
//! - `add`, `remove` are primitive edits supplied by the target
//! - `replace` is a remove followed by an add at the same path
//! - `move` removes at `from` and adds the removed value at `path`
//! - `copy` adds the value found at `from`, leaving the source untouched
//! - `test` compares structurally and never mutates
//!
//! # Failure modes
//!
//! Two kinds of failure are kept apart. A patch object that is missing a
//! required member or names an unknown op is malformed and rejected with an
//! [`Error`](crate::error::Error) before anything is applied. An operation
//! that is well formed but cannot apply (unresolvable parent, non-integer
//! array index, a `test` that does not hold) makes [`apply`] return `false`.
//!
//! # Wire format
//!
//! Patch lists travel as JSON arrays of `{op, path, value?, from?}` objects.
//! A compact MessagePack encoding of the same structure is also provided for
//! transports that ship binary frames.

mod apply;
mod ops;
mod path;

pub use apply::{apply, apply_json, apply_op, PatchTarget};
pub(crate) use apply::{add_at, read_at, remove_at};
pub use ops::{parse_patches, PatchOp};
pub use path::Path;

use crate::error::Result;

/// Render a patch list as a JSON array.
pub fn to_json(ops: &[PatchOp]) -> Result<String> {
    Ok(serde_json::to_string(ops)?)
}

/// Parse and validate a JSON patch document.
pub fn from_json(text: &str) -> Result<Vec<PatchOp>> {
    let raw: serde_json::Value = serde_json::from_str(text)?;
    parse_patches(&raw)
}

/// Encode a patch list as MessagePack with named fields.
pub fn to_msgpack(ops: &[PatchOp]) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(ops)?)
}

pub fn from_msgpack(bytes: &[u8]) -> Result<Vec<PatchOp>> {
    Ok(rmp_serde::from_slice(bytes)?)
}
