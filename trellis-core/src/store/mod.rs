//! Stores
//!
//! A store projects a tree of reactive entries through a keyed interface.
//! Each key holds one [`Entry`] classified at assignment time:
//!
//! - plain objects become nested stores
//! - other plain values become observable cells
//! - [`Slot::Computed`] becomes a computed bound to the store
//! - [`Slot::Action`] becomes a callable that runs as one transaction
//! - [`Slot::Unobserved`] is kept as plain data
//!
//! # Patches
//!
//! Every store keeps a snapshot computed over its plain-data projection and
//! a diff reaction that compares consecutive snapshots. The resulting `add`
//! and `remove` operations are collected and handed to patch listeners once
//! per committed transaction. Nested stores diff themselves and forward
//! their operations upward with their key prefixed.
//!
//! Inbound patches run against the store itself as the target document, so
//! they go through the same observables and the same transaction machinery
//! as direct writes.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use trellis_core::reactive::Runtime;
//! use trellis_core::store::Store;
//!
//! let runtime = Runtime::new();
//! let store = Store::builder(&runtime)
//!     .state("first", "Andy")
//!     .state("last", "Johnson")
//!     .computed("full", |s| {
//!         let first = s.value("first").unwrap_or_default();
//!         let last = s.value("last").unwrap_or_default();
//!         json!(format!("{} {}", first.as_str().unwrap_or(""), last.as_str().unwrap_or("")))
//!     })
//!     .build()
//!     .unwrap();
//!
//! store.set("first", "John").unwrap();
//! assert_eq!(store.value("full"), Some(json!("John Johnson")));
//! ```

mod builder;
mod entry;
mod listeners;
mod snapshot;
mod target;

pub use builder::StoreBuilder;
pub use entry::{is_reserved, ActionFn, ComputedFn, EntryKind, Field, Slot, RESERVED_KEYS};
pub use listeners::{ActionEvent, ActionListener, PatchListener, SnapshotListener};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use self::entry::{json_type, Entry};
use self::listeners::Listeners;
use self::snapshot::{Projection, Reactions};
use crate::error::{Error, Result};
use crate::patch::{self, Path, PatchOp};
use crate::reactive::{Computed, Observable, Runtime};

struct StoreInner {
    runtime: Runtime,
    entries: RwLock<IndexMap<String, Entry>>,
    /// Bumped whenever a key is added, removed or reclassified.
    manifest: Observable<u64>,
    /// Bumped whenever an unobserved value changes.
    revision: Observable<u64>,
    parent: RwLock<Weak<StoreInner>>,
    /// Key under which the parent holds this store.
    key: RwLock<Option<String>>,
    reactions: Mutex<Option<Reactions>>,
    previous: Mutex<Option<Projection>>,
    outbox: Mutex<Vec<PatchOp>>,
    patch_listeners: Listeners<dyn Fn(&[PatchOp]) + Send + Sync>,
    action_listeners: Listeners<dyn Fn(&ActionEvent) + Send + Sync>,
    snapshot_listeners: Listeners<dyn Fn(&Value) + Send + Sync>,
    disposed: AtomicBool,
}

/// A reactive object tree. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn builder(runtime: &Runtime) -> StoreBuilder {
        StoreBuilder::new(runtime)
    }

    /// Build a store from a JSON object of initial state and a set of
    /// actions. A key present in both is an error.
    pub fn new<I, K>(runtime: &Runtime, state: Value, actions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, ActionFn)>,
        K: Into<String>,
    {
        let Value::Object(map) = state else {
            return Err(Error::NotAnObject {
                found: json_type(&state),
            });
        };
        let mut builder = StoreBuilder::new(runtime);
        for (key, value) in map {
            builder = builder.state(key, value);
        }
        for (key, action) in actions {
            builder = builder.slot(key, Slot::Action(action));
        }
        builder.build()
    }

    /// Build a store holding only state.
    pub fn from_value(runtime: &Runtime, state: Value) -> Result<Self> {
        Self::new(runtime, state, std::iter::empty::<(String, ActionFn)>())
    }

    /// Create a store, populate it, then start its snapshot reactions so the
    /// initial entries are not reported as patches.
    pub(crate) fn assemble(runtime: &Runtime, entries: Vec<(String, Slot)>) -> Result<Self> {
        let store = Self::bare(runtime);
        for (key, slot) in entries {
            if is_reserved(&key) {
                store.dispose();
                return Err(Error::ReservedKey { key });
            }
            if let Err(err) = store.assign(key, slot) {
                store.dispose();
                return Err(err);
            }
        }
        store.start();
        Ok(store)
    }

    fn bare(runtime: &Runtime) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                runtime: runtime.clone(),
                entries: RwLock::new(IndexMap::new()),
                manifest: Observable::new(runtime, 0),
                revision: Observable::new(runtime, 0),
                parent: RwLock::new(Weak::new()),
                key: RwLock::new(None),
                reactions: Mutex::new(None),
                previous: Mutex::new(None),
                outbox: Mutex::new(Vec::new()),
                patch_listeners: Listeners::new(),
                action_listeners: Listeners::new(),
                snapshot_listeners: Listeners::new(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    fn downgrade(&self) -> Weak<StoreInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Whether two handles refer to the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// The entry under `key`, without tracking.
    fn lookup(&self, key: &str) -> Option<Entry> {
        self.inner.entries.read().get(key).cloned()
    }

    /// The entry under `key`. The running reaction comes to depend on the
    /// key set, so it re-runs when the key appears, goes away or changes
    /// kind.
    fn entry(&self, key: &str) -> Option<Entry> {
        self.inner.manifest.get();
        self.lookup(key)
    }

    /// Read a key. Observable and computed entries unwrap to their current
    /// value; actions and nested stores pass through.
    pub fn get(&self, key: &str) -> Option<Field> {
        if self.is_disposed() {
            return None;
        }
        match self.entry(key)? {
            Entry::Unobserved(value) => Some(Field::Value(value)),
            Entry::Observable(cell) => cell.get().map(Field::Value),
            Entry::Computed(computed) => computed.get().map(Field::Value),
            Entry::Action(action) => Some(Field::Action(action)),
            Entry::Store(store) => Some(Field::Store(store)),
        }
    }

    /// The plain-data value of a key. Nested stores yield their snapshot,
    /// actions yield nothing.
    pub fn value(&self, key: &str) -> Option<Value> {
        match self.get(key)? {
            Field::Value(value) => Some(value),
            Field::Store(store) => Some(store.snapshot()),
            Field::Action(_) => None,
        }
    }

    /// The nested store under `key`.
    pub fn child(&self, key: &str) -> Option<Store> {
        self.get(key)?.into_store()
    }

    /// The cell backing an observable key, for array mutators and direct
    /// subscriptions.
    pub fn observable(&self, key: &str) -> Option<Observable<Value>> {
        match self.entry(key)? {
            Entry::Observable(cell) if !self.is_disposed() => Some(cell),
            _ => None,
        }
    }

    pub fn kind_of(&self, key: &str) -> Option<EntryKind> {
        self.lookup(key).map(|entry| entry.kind())
    }

    /// Whether `key` is a visible state key. Actions and reserved keys are
    /// never visible.
    pub fn has(&self, key: &str) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.inner.manifest.get();
        self.kind_of(key).is_some_and(EntryKind::is_visible)
    }

    /// Visible state keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.inner.manifest.get();
        self.inner
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.kind().is_visible())
            .map(|(key, _)| key.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    /// Assign to a key.
    ///
    /// A plain value or another observable written to an observable key
    /// goes through the existing cell, which keeps its identity. Anything
    /// else disposes the previous entry and classifies the new one, so a key
    /// may change kind over its lifetime.
    pub fn set(&self, key: impl Into<String>, slot: impl Into<Slot>) -> Result<()> {
        self.ensure_live()?;
        let key = key.into();
        if is_reserved(&key) {
            return Err(Error::ReservedKey { key });
        }
        let slot = slot.into();
        self.inner.runtime.transaction(|| self.assign(key, slot))
    }

    fn assign(&self, key: String, slot: Slot) -> Result<()> {
        let current = self.lookup(&key);
        match (current, slot) {
            (Some(Entry::Observable(cell)), Slot::Value(value)) if !value.is_object() => {
                cell.set(value);
                Ok(())
            }
            (Some(Entry::Unobserved(_)), Slot::Value(value)) => {
                self.replace_unobserved(key, value);
                Ok(())
            }
            (Some(Entry::Store(existing)), Slot::Store(store)) if existing.ptr_eq(&store) => Ok(()),
            (Some(Entry::Observable(existing)), Slot::Observable(cell)) => {
                if !existing.ptr_eq(&cell) {
                    if let Some(value) = cell.latest() {
                        existing.set(value);
                    }
                }
                Ok(())
            }
            (current, slot) => {
                let entry = self.classify(&key, slot)?;
                if let Some(previous) = current {
                    trace!(key = %key, from = ?previous.kind(), to = ?entry.kind(), "store key reclassified");
                    previous.dispose();
                }
                self.replace(key, entry);
                Ok(())
            }
        }
    }

    fn classify(&self, key: &str, slot: Slot) -> Result<Entry> {
        let runtime = &self.inner.runtime;
        let entry = match slot {
            Slot::Value(Value::Object(map)) => {
                let child = Store::assemble(runtime, map.into_iter().map(|(k, v)| (k, Slot::Value(v))).collect())?;
                self.adopt(key, &child);
                Entry::Store(child)
            }
            Slot::Value(value) => Entry::Observable(Observable::new(runtime, value)),
            Slot::Unobserved(value) => Entry::Unobserved(value),
            Slot::Computed(thunk) => {
                let weak = self.downgrade();
                Entry::Computed(Computed::new(runtime, move || match weak.upgrade() {
                    Some(inner) => thunk(&Store::from_inner(inner)),
                    None => Value::Null,
                }))
            }
            Slot::Action(action) => Entry::Action(action),
            Slot::Observable(cell) => Entry::Observable(cell),
            Slot::Store(child) => {
                self.adopt(key, &child);
                Entry::Store(child)
            }
        };
        Ok(entry)
    }

    fn adopt(&self, key: &str, child: &Store) {
        *child.inner.parent.write() = self.downgrade();
        *child.inner.key.write() = Some(key.to_string());
    }

    fn replace(&self, key: String, entry: Entry) {
        self.inner.entries.write().insert(key, entry);
        self.touch();
    }

    /// Store a new unobserved value. Only snapshots notice.
    fn replace_unobserved(&self, key: String, value: Value) {
        self.inner.entries.write().insert(key, Entry::Unobserved(value));
        self.inner.revision.update(|version| version.wrapping_add(1));
    }

    fn touch(&self) {
        self.inner.manifest.update(|version| version.wrapping_add(1));
    }

    /// Remove a key, disposing whatever it held.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.ensure_live()?;
        let removed = self.inner.entries.write().shift_remove(key);
        let Some(entry) = removed else {
            return Err(Error::KeyNotFound { key: key.to_string() });
        };
        trace!(key, kind = ?entry.kind(), "store key deleted");
        self.inner.runtime.transaction(|| {
            entry.dispose();
            self.touch();
        });
        Ok(())
    }

    /// Invoke the action stored under `key` as one transaction.
    pub fn call(&self, key: &str, args: &[Value]) -> Result<()> {
        self.ensure_live()?;
        let action = match self.lookup(key) {
            Some(Entry::Action(action)) => action,
            Some(_) => return Err(Error::NotAnAction { key: key.to_string() }),
            None => return Err(Error::KeyNotFound { key: key.to_string() }),
        };
        self.dispatch_action(&ActionEvent {
            path: Path::root(),
            name: key.to_string(),
            args: args.to_vec(),
        });
        self.inner.runtime.transaction(|| action(self, args));
        Ok(())
    }

    fn dispatch_action(&self, event: &ActionEvent) {
        for listener in self.inner.action_listeners.snapshot() {
            listener(event);
        }
        if let Some((parent, key)) = self.parent_link() {
            parent.dispatch_action(&event.prefixed(&key));
        }
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    /// Assign every key of `snapshot` into the store, then delete state keys
    /// the snapshot does not mention. Computed and action keys are left
    /// alone.
    pub fn restore(&self, snapshot: &Value) -> Result<()> {
        self.ensure_live()?;
        let Value::Object(map) = snapshot else {
            return Err(Error::NotAnObject {
                found: json_type(snapshot),
            });
        };
        self.inner.runtime.transaction(|| self.restore_object(map))
    }

    fn restore_object(&self, map: &Map<String, Value>) -> Result<()> {
        let before: Vec<String> = self
            .inner
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| !matches!(entry, Entry::Computed(_) | Entry::Action(_)))
            .map(|(key, _)| key.clone())
            .collect();

        for (key, value) in map {
            if is_reserved(key) {
                continue;
            }
            match self.lookup(key) {
                Some(Entry::Computed(_)) | Some(Entry::Action(_)) => {}
                Some(Entry::Store(child)) if value.is_object() => child.restore(value)?,
                _ => self.assign(key.clone(), Slot::Value(value.clone()))?,
            }
        }

        for key in before {
            if !map.contains_key(&key) {
                self.delete(&key)?;
            }
        }
        Ok(())
    }

    /// Apply patch operations to the store as one transaction.
    pub fn patch(&self, ops: &[PatchOp]) -> Result<bool> {
        self.ensure_live()?;
        let mut target = self.clone();
        Ok(self.inner.runtime.transaction(|| patch::apply(&mut target, ops)))
    }

    /// Validate a raw JSON patch document, then apply it.
    pub fn patch_json(&self, raw: &Value) -> Result<bool> {
        let ops = patch::parse_patches(raw)?;
        self.patch(&ops)
    }

    /// Add a patch listener. Returns `false` if it was already registered.
    pub fn register(&self, listener: &PatchListener) -> bool {
        self.inner.patch_listeners.add(listener)
    }

    pub fn unregister(&self, listener: &PatchListener) -> bool {
        self.inner.patch_listeners.remove(listener)
    }

    pub fn on_action(&self, listener: &ActionListener) -> bool {
        self.inner.action_listeners.add(listener)
    }

    pub fn off_action(&self, listener: &ActionListener) -> bool {
        self.inner.action_listeners.remove(listener)
    }

    pub fn on_snapshot(&self, listener: &SnapshotListener) -> bool {
        self.inner.snapshot_listeners.add(listener)
    }

    pub fn off_snapshot(&self, listener: &SnapshotListener) -> bool {
        self.inner.snapshot_listeners.remove(listener)
    }

    /// The store holding this one, if it is nested.
    pub fn parent(&self) -> Option<Store> {
        self.inner.parent.read().upgrade().map(Store::from_inner)
    }

    fn parent_link(&self) -> Option<(Store, String)> {
        let parent = self.parent()?;
        let key = self.inner.key.read().clone()?;
        Some((parent, key))
    }

    /// Location of this store from the root of its tree.
    pub fn path(&self) -> Path {
        let mut segments = Vec::new();
        let mut current = self.clone();
        while let Some((parent, key)) = current.parent_link() {
            segments.push(key);
            current = parent;
        }
        segments.reverse();
        Path::from(segments)
    }

    /// Dispose every entry, cascading into nested stores. Later reads come
    /// back empty and writes fail with [`Error::Disposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let reactions = self.inner.reactions.lock().take();
        if let Some(reactions) = reactions {
            reactions.dispose();
        }
        let entries = std::mem::take(&mut *self.inner.entries.write());
        for entry in entries.values() {
            entry.dispose();
        }
        self.touch();
        self.inner.manifest.dispose();
        self.inner.revision.dispose();
        self.inner.previous.lock().take();
        self.inner.outbox.lock().clear();
        self.inner.patch_listeners.clear();
        self.inner.action_listeners.clear();
        self.inner.snapshot_listeners.clear();
        debug!(entries = entries.len(), "store disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path().to_pointer())
            .field("keys", &self.inner.entries.read().keys().collect::<Vec<_>>())
            .field("listeners", &self.inner.patch_listeners)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
