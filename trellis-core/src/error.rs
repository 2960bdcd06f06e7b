//! Error Types
//!
//! Hard failures of the reactive core. Recoverable outcomes (a patch that did
//! not apply, a `test` op that did not hold) are reported as `Ok(false)` and
//! never reach this type.

use thiserror::Error;

/// Errors raised by observables, stores and the patch engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Computed values are derived; their public interface is read-only.
    #[error("computed values cannot be set")]
    ComputedWrite,

    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    /// A store was declared with the same key in both state and actions.
    #[error("key overlap between state and actions: {key}")]
    KeyCollision { key: String },

    #[error("key is reserved for store control operations: {key}")]
    ReservedKey { key: String },

    #[error("key is not an action: {key}")]
    NotAnAction { key: String },

    #[error("array mutator applied to a non-array value")]
    NotAnArray,

    /// Store state and snapshots must be JSON objects.
    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("store has been disposed")]
    Disposed,

    /// A patch object is missing a required field or has a malformed pointer.
    #[error("invalid patch: {reason}")]
    InvalidPatch { reason: String },

    #[error("invalid operation type: {op}")]
    UnknownOp { op: String },

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl Error {
    pub(crate) fn invalid_patch(reason: impl Into<String>) -> Self {
        Self::InvalidPatch {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
