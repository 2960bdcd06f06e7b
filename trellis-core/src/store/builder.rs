//! Store construction.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use super::entry::{ActionFn, Slot};
use super::Store;
use crate::error::{Error, Result};
use crate::reactive::Runtime;

/// Collects declared state and actions, then builds a [`Store`].
///
/// State keys and action keys live in separate namespaces while building;
/// a key declared in both is rejected by [`build`](Self::build).
pub struct StoreBuilder {
    runtime: Runtime,
    state: IndexMap<String, Slot>,
    actions: IndexMap<String, ActionFn>,
}

impl StoreBuilder {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            state: IndexMap::new(),
            actions: IndexMap::new(),
        }
    }

    /// Plain state. Objects become nested stores.
    pub fn state(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.slot(key, Slot::Value(value.into()))
    }

    pub fn unobserved(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.slot(key, Slot::Unobserved(value.into()))
    }

    pub fn computed<F>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Store) -> Value + Send + Sync + 'static,
    {
        self.slot(key, Slot::computed(f))
    }

    pub fn action<F>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Store, &[Value]) + Send + Sync + 'static,
    {
        self.slot(key, Slot::Action(Arc::new(f)))
    }

    /// Declare any kind of entry. Actions go to the action namespace.
    pub fn slot(mut self, key: impl Into<String>, slot: Slot) -> Self {
        let key = key.into();
        match slot {
            Slot::Action(action) => {
                self.actions.insert(key, action);
            }
            other => {
                self.state.insert(key, other);
            }
        }
        self
    }

    pub fn build(self) -> Result<Store> {
        if let Some(key) = self.actions.keys().find(|key| self.state.contains_key(*key)) {
            return Err(Error::KeyCollision { key: key.clone() });
        }
        let entries = self
            .state
            .into_iter()
            .chain(self.actions.into_iter().map(|(key, action)| (key, Slot::Action(action))))
            .collect();
        Store::assemble(&self.runtime, entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntryKind;
    use serde_json::json;

    #[test]
    fn state_and_action_keys_must_not_overlap() {
        let runtime = Runtime::new();
        let result = Store::builder(&runtime)
            .state("test", 1)
            .action("test", |_, _| {})
            .build();
        assert!(matches!(result, Err(Error::KeyCollision { key }) if key == "test"));

        let action: ActionFn = Arc::new(|_: &Store, _: &[Value]| {});
        let result = Store::new(&runtime, json!({"go": 1}), vec![("go", action)]);
        assert!(matches!(result, Err(Error::KeyCollision { .. })));
    }

    #[test]
    fn empty_store() {
        let runtime = Runtime::new();
        let store = Store::builder(&runtime).build().unwrap();
        assert!(store.keys().is_empty());
        assert_eq!(store.snapshot(), json!({}));
    }

    #[test]
    fn later_declarations_replace_earlier_ones() {
        let runtime = Runtime::new();
        let store = Store::builder(&runtime)
            .state("a", 1)
            .unobserved("a", 2)
            .build()
            .unwrap();
        assert_eq!(store.kind_of("a"), Some(EntryKind::Unobserved));
        assert_eq!(store.value("a"), Some(json!(2)));
    }
}
