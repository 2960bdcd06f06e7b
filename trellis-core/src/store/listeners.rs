//! Listener registries.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::patch::{Path, PatchOp};

/// Receives the patches a store emitted for one committed transaction.
pub type PatchListener = Arc<dyn Fn(&[PatchOp]) + Send + Sync>;

/// Receives store action invocations.
pub type ActionListener = Arc<dyn Fn(&ActionEvent) + Send + Sync>;

/// Receives the new snapshot after a flush that emitted patches.
pub type SnapshotListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// One invocation of a store action.
///
/// `path` locates the store owning the action, relative to the store whose
/// listener receives the event.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEvent {
    pub path: Path,
    pub name: String,
    pub args: Vec<Value>,
}

impl ActionEvent {
    pub(crate) fn prefixed(&self, segment: &str) -> Self {
        Self {
            path: self.path.prefixed(segment),
            name: self.name.clone(),
            args: self.args.clone(),
        }
    }
}

/// Ordered set of listeners, compared by allocation identity.
pub(crate) struct Listeners<F: ?Sized> {
    entries: Mutex<Vec<Arc<F>>>,
}

impl<F: ?Sized> Listeners<F> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Add a listener. Registering the same listener twice is a no-op and
    /// returns `false`.
    pub(crate) fn add(&self, listener: &Arc<F>) -> bool {
        let mut entries = self.entries.lock();
        if entries.iter().any(|existing| same(existing, listener)) {
            return false;
        }
        entries.push(Arc::clone(listener));
        true
    }

    pub(crate) fn remove(&self, listener: &Arc<F>) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|existing| !same(existing, listener));
        entries.len() != before
    }

    /// Copy of the current listeners, so callbacks run without the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<F: ?Sized> fmt::Debug for Listeners<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

// Data pointers only: vtable pointers for the same closure may differ
// between codegen units.
fn same<F: ?Sized>(a: &Arc<F>, b: &Arc<F>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn registration_is_idempotent() {
        let listeners: Listeners<dyn Fn(&[PatchOp]) + Send + Sync> = Listeners::new();
        let first: PatchListener = Arc::new(|_: &[PatchOp]| {});
        let second: PatchListener = Arc::new(|_: &[PatchOp]| {});

        assert!(listeners.add(&first));
        assert!(!listeners.add(&first));
        assert!(listeners.add(&second));
        assert_eq!(listeners.len(), 2);

        assert!(listeners.remove(&first));
        assert!(!listeners.remove(&first));
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let listeners: Listeners<dyn Fn(&Value) + Send + Sync> = Listeners::new();
        let calls = Arc::new(AtomicI32::new(0));

        let c1 = calls.clone();
        let first: SnapshotListener = Arc::new(move |_: &Value| {
            assert_eq!(c1.fetch_add(1, Ordering::SeqCst), 0);
        });
        let c2 = calls.clone();
        let second: SnapshotListener = Arc::new(move |_: &Value| {
            assert_eq!(c2.fetch_add(1, Ordering::SeqCst), 1);
        });
        listeners.add(&first);
        listeners.add(&second);

        for listener in listeners.snapshot() {
            listener(&Value::Null);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        listeners.clear();
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn action_event_prefix() {
        let event = ActionEvent {
            path: Path::from(["child"]),
            name: "increment".into(),
            args: vec![Value::from(1)],
        };
        let forwarded = event.prefixed("root");
        assert_eq!(forwarded.path.to_pointer(), "/root/child");
        assert_eq!(forwarded.name, "increment");
    }
}
