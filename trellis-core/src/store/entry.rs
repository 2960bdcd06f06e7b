//! Store entries.
//!
//! Every key of a store holds exactly one [`Entry`]. Assignment input is an
//! explicit [`Slot`] so the caller states what a value is instead of the
//! store guessing from its shape; reads come back as a [`Field`].

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::Store;
use crate::reactive::{Computed, Observable};

/// Keys that address store control operations. They can never hold state.
pub const RESERVED_KEYS: [&str; 9] = [
    "snapshot",
    "restore",
    "patch",
    "apply",
    "parent",
    "type",
    "dispose",
    "register",
    "unregister",
];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Derivation bound to the store it lives in.
pub type ComputedFn = Arc<dyn Fn(&Store) -> Value + Send + Sync>;

/// Mutation bound to the store it lives in. Runs as one transaction.
pub type ActionFn = Arc<dyn Fn(&Store, &[Value]) + Send + Sync>;

/// What is being assigned to a key.
#[derive(Clone)]
pub enum Slot {
    /// Plain data. Objects become nested stores, everything else an
    /// observable cell.
    Value(Value),
    /// Plain data kept out of dependency tracking.
    Unobserved(Value),
    Computed(ComputedFn),
    Action(ActionFn),
    /// An existing cell, installed as-is.
    Observable(Observable<Value>),
    /// An existing store, installed as-is and re-parented.
    Store(Store),
}

impl Slot {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Store) -> Value + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    pub fn action<F>(f: F) -> Self
    where
        F: Fn(&Store, &[Value]) + Send + Sync + 'static,
    {
        Self::Action(Arc::new(f))
    }

    pub fn unobserved(value: impl Into<Value>) -> Self {
        Self::Unobserved(value.into())
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Observable<Value>> for Slot {
    fn from(cell: Observable<Value>) -> Self {
        Self::Observable(cell)
    }
}

impl From<Store> for Slot {
    fn from(store: Store) -> Self {
        Self::Store(store)
    }
}

macro_rules! slot_from_plain {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Slot {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

slot_from_plain!(bool, i32, i64, u32, u64, f64, &str, String);

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Unobserved(value) => f.debug_tuple("Unobserved").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
            Self::Action(_) => f.write_str("Action(..)"),
            Self::Observable(cell) => f.debug_tuple("Observable").field(cell).finish(),
            Self::Store(store) => f.debug_tuple("Store").field(store).finish(),
        }
    }
}

/// Classification of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Unobserved,
    Observable,
    Computed,
    Action,
    Store,
}

impl EntryKind {
    /// Whether keys of this kind show up in `keys()` and `has()`.
    pub fn is_visible(self) -> bool {
        !matches!(self, Self::Action)
    }
}

/// What a key currently holds.
#[derive(Clone)]
pub(crate) enum Entry {
    Unobserved(Value),
    Observable(Observable<Value>),
    Computed(Computed<Value>),
    Action(ActionFn),
    Store(Store),
}

impl Entry {
    pub(crate) fn kind(&self) -> EntryKind {
        match self {
            Self::Unobserved(_) => EntryKind::Unobserved,
            Self::Observable(_) => EntryKind::Observable,
            Self::Computed(_) => EntryKind::Computed,
            Self::Action(_) => EntryKind::Action,
            Self::Store(_) => EntryKind::Store,
        }
    }

    /// Release whatever reactive resources the entry owns.
    pub(crate) fn dispose(&self) {
        match self {
            Self::Observable(cell) => cell.dispose(),
            Self::Computed(computed) => computed.dispose(),
            Self::Store(store) => store.dispose(),
            Self::Unobserved(_) | Self::Action(_) => {}
        }
    }
}

/// The result of reading a key.
#[derive(Clone)]
pub enum Field {
    /// The current value of an observable, computed or unobserved key.
    Value(Value),
    Action(ActionFn),
    Store(Store),
}

impl Field {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_store(self) -> Option<Store> {
        match self {
            Self::Store(store) => Some(store),
            _ => None,
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action(_))
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Action(_) => f.write_str("Action(..)"),
            Self::Store(store) => f.debug_tuple("Store").field(store).finish(),
        }
    }
}

/// Short name of a JSON value's type, for error messages.
pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
