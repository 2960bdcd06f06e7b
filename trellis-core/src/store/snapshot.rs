//! Snapshots and outbound patch emission.
//!
//! The snapshot computed materializes the store as plain JSON. The diff
//! autorun depends only on that computed, so it always compares fully
//! recomputed snapshots, and turns the difference into `add`/`remove`
//! operations. Operations are buffered in the store's outbox and flushed by
//! a commit hook, which the runtime collapses to one call per transaction.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use super::entry::Entry;
use super::Store;
use crate::patch::PatchOp;
use crate::reactive::{Autorun, Computed};

/// The reactions every started store owns.
pub(super) struct Reactions {
    snapshot: Computed<Value>,
    diff: Option<Autorun>,
}

impl Reactions {
    pub(super) fn dispose(&self) {
        if let Some(diff) = &self.diff {
            diff.dispose();
        }
        self.snapshot.dispose();
    }
}

/// The diffable part of a snapshot: data keys by value, nested stores by
/// identity. Computed keys are derived and never diffed.
#[derive(Clone)]
pub(super) enum Projected {
    Value(Value),
    Store { store: Store, snapshot: Value },
}

pub(super) type Projection = IndexMap<String, Projected>;

/// How `materialize` reads entries.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum Read {
    /// Committed values, registering dependencies.
    Tracked,
    /// Latest values including writes parked in an open transaction.
    Latest,
}

impl Store {
    /// Create the snapshot computed and the diff autorun. The snapshot must
    /// be in place first: the diff's first run subscribes to it and records
    /// the starting projection.
    pub(super) fn start(&self) {
        let runtime = self.runtime().clone();

        let weak = self.downgrade();
        let snapshot = Computed::new(&runtime, move || match weak.upgrade() {
            Some(inner) => Store::from_inner(inner).materialize(Read::Tracked),
            None => Value::Null,
        });
        *self.inner.reactions.lock() = Some(Reactions { snapshot, diff: None });

        let weak = self.downgrade();
        let diff = Autorun::new(&runtime, move || {
            if let Some(inner) = weak.upgrade() {
                Store::from_inner(inner).diff_step();
            }
        });
        if let Some(reactions) = self.inner.reactions.lock().as_mut() {
            reactions.diff = Some(diff);
        }
    }

    /// The store as plain JSON: data, computed values and nested snapshots.
    /// Actions are left out. Reading it inside a reaction subscribes to it.
    pub fn snapshot(&self) -> Value {
        if self.is_disposed() {
            return Value::Null;
        }
        let computed = self
            .inner
            .reactions
            .lock()
            .as_ref()
            .map(|reactions| reactions.snapshot.clone());
        computed.and_then(|snapshot| snapshot.get()).unwrap_or(Value::Null)
    }

    pub(super) fn materialize(&self, read: Read) -> Value {
        if read == Read::Tracked {
            self.inner.manifest.get();
            self.inner.revision.get();
        }
        let entries: Vec<(String, Entry)> = self
            .inner
            .entries
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();

        let mut out = Map::new();
        for (key, entry) in entries {
            let value = match (entry, read) {
                (Entry::Unobserved(value), _) => Some(value),
                (Entry::Observable(cell), Read::Tracked) => cell.get(),
                (Entry::Observable(cell), Read::Latest) => cell.latest(),
                (Entry::Computed(computed), Read::Tracked) => computed.get(),
                (Entry::Computed(computed), Read::Latest) => computed.get_untracked(),
                (Entry::Store(child), Read::Tracked) => Some(child.snapshot()),
                (Entry::Store(child), Read::Latest) => Some(child.materialize(Read::Latest)),
                (Entry::Action(_), _) => continue,
            };
            out.insert(key, value.unwrap_or(Value::Null));
        }
        Value::Object(out)
    }

    fn diff_step(&self) {
        let snapshot = self.snapshot();
        let next = self.runtime().untracked(|| self.project(&snapshot));
        let previous = self.inner.previous.lock().replace(next.clone());
        let Some(previous) = previous else {
            return;
        };
        let ops = diff(&previous, &next);
        if !ops.is_empty() {
            self.emit(ops);
        }
    }

    fn project(&self, snapshot: &Value) -> Projection {
        let entries: Vec<(String, Entry)> = self
            .inner
            .entries
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();

        let mut projection = Projection::new();
        for (key, entry) in entries {
            let value = snapshot.get(&key).cloned().unwrap_or(Value::Null);
            let projected = match entry {
                Entry::Unobserved(_) | Entry::Observable(_) => Projected::Value(value),
                Entry::Store(store) => Projected::Store { store, snapshot: value },
                Entry::Computed(_) | Entry::Action(_) => continue,
            };
            projection.insert(key, projected);
        }
        projection
    }

    /// Queue operations for this store's listeners and forward them up the
    /// tree, prefixed with this store's key.
    fn emit(&self, ops: Vec<PatchOp>) {
        if let Some((parent, key)) = self.parent_link() {
            parent.emit(ops.iter().map(|op| op.prefixed(&key)).collect());
        }
        {
            let mut outbox = self.inner.outbox.lock();
            for op in &ops {
                // A whole-value add or remove supersedes queued edits below it.
                if let PatchOp::Add { path, .. } | PatchOp::Remove { path } = op {
                    outbox.retain(|queued| !(queued.path().len() > path.len() && queued.path().starts_with(path)));
                }
            }
            outbox.extend(ops);
        }

        let weak = self.downgrade();
        let hook_key = self.inner.manifest.id().raw();
        self.runtime().defer_commit(hook_key, move || {
            if let Some(inner) = weak.upgrade() {
                Store::from_inner(inner).flush();
            }
        });
    }

    fn flush(&self) {
        let ops = std::mem::take(&mut *self.inner.outbox.lock());
        if ops.is_empty() || self.is_disposed() {
            return;
        }
        debug!(count = ops.len(), path = %self.path(), "emitting patches");
        self.runtime().untracked(|| {
            for listener in self.inner.patch_listeners.snapshot() {
                listener(&ops);
            }
            let listeners = self.inner.snapshot_listeners.snapshot();
            if !listeners.is_empty() {
                let snapshot = self.snapshot();
                for listener in listeners {
                    listener(&snapshot);
                }
            }
        });
    }
}

/// Shallow comparison of two projections.
fn diff(previous: &Projection, next: &Projection) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    for key in previous.keys() {
        if !next.contains_key(key) {
            ops.push(PatchOp::remove([key.as_str()]));
        }
    }
    for (key, after) in next {
        match (previous.get(key), after) {
            (Some(Projected::Value(before)), Projected::Value(value)) if before == value => {}
            (Some(Projected::Store { store: before, .. }), Projected::Store { store, .. })
                if before.ptr_eq(store) => {}
            (_, Projected::Value(value)) | (_, Projected::Store { snapshot: value, .. }) => {
                ops.push(PatchOp::add([key.as_str()], value.clone()));
            }
        }
    }
    ops
}
