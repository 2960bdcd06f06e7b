//! Computed Implementation
//!
//! A Computed is a memoized derived value: a backing observable fed by a
//! dedicated autorun that evaluates the thunk and writes the result.
//!
//! # How Computeds Work
//!
//! 1. On creation the driving autorun evaluates the thunk once and stores
//!    the result directly in the backing cell.
//!
//! 2. Reading a computed reads the backing cell. The reader depends on the
//!    cell, never on the thunk's own inputs, and the thunk is not re-run.
//!
//! 3. When an input changes the driving autorun re-evaluates and writes the
//!    backing cell, which in turn notifies readers. Inside a transaction the
//!    driving autorun waits in the computed queue, ahead of plain autoruns,
//!    so autoruns never see a stale derived value.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::autorun::Autorun;
use super::observable::Observable;
use super::runtime::Runtime;
use super::subscriber::ReactionKind;
use crate::error::{Error, Result};

struct ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    cell: Observable<T>,
    reaction: Mutex<Option<Autorun>>,
    disposed: AtomicBool,
}

/// A cached derived value that recomputes when its inputs change.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Computed, Observable, Runtime};
///
/// let runtime = Runtime::new();
/// let count = Observable::new(&runtime, 2);
/// let reader = count.clone();
/// let doubled = Computed::new(&runtime, move || reader.get().unwrap_or_default() * 2);
///
/// assert_eq!(doubled.get(), Some(4));
/// count.set(5);
/// assert_eq!(doubled.get(), Some(10));
/// assert!(doubled.set(1).is_err());
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed and evaluate it once.
    pub fn new<F>(runtime: &Runtime, thunk: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let cell = Observable::empty(runtime);
        let initialized = AtomicBool::new(false);

        let target = cell.clone();
        let reaction = Autorun::with_kind(
            runtime,
            ReactionKind::Computed,
            Box::new(move || {
                let value = thunk();
                // Nothing can observe the cell before the first evaluation,
                // so it is stored even inside a transaction.
                if initialized.swap(true, Ordering::SeqCst) {
                    target.set(value);
                } else {
                    target.init(value);
                }
            }),
        );

        Self {
            inner: Arc::new(ComputedInner {
                cell,
                reaction: Mutex::new(Some(reaction)),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Get the cached value. Returns `None` after disposal.
    pub fn get(&self) -> Option<T> {
        if self.is_disposed() {
            return None;
        }
        self.inner.cell.get()
    }

    /// Get the cached value without registering a dependency.
    pub fn get_untracked(&self) -> Option<T> {
        if self.is_disposed() {
            return None;
        }
        self.inner.cell.get_untracked()
    }

    /// Computed values are read-only. Always fails.
    pub fn set(&self, _value: T) -> Result<()> {
        Err(Error::ComputedWrite)
    }

    /// Dispose the backing cell, then the driving autorun.
    pub fn dispose(&self) {
        self.inner.cell.dispose();
        if let Some(reaction) = self.inner.reaction.lock().take() {
            reaction.dispose();
        }
        self.inner.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// How many times the thunk has been evaluated.
    pub fn run_count(&self) -> usize {
        self.inner
            .reaction
            .lock()
            .as_ref()
            .map(|reaction| reaction.run_count())
            .unwrap_or(0)
    }

    /// Number of readers depending on this computed.
    pub fn subscriber_count(&self) -> usize {
        self.inner.cell.subscriber_count()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.get_untracked())
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::autorun;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn computed_evaluates_on_creation() {
        let runtime = Runtime::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let computed = Computed::new(&runtime, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(computed.get(), Some(42));
    }

    #[test]
    fn computed_caches_between_changes() {
        let runtime = Runtime::new();
        let source = Observable::new(&runtime, 1);
        let calls = Arc::new(AtomicI32::new(0));

        let (reader, counter) = (source.clone(), calls.clone());
        let computed = Computed::new(&runtime, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            reader.get().unwrap_or_default() * 10
        });

        assert_eq!(computed.get(), Some(10));
        assert_eq!(computed.get(), Some(10));
        assert_eq!(computed.get(), Some(10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        source.set(2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(computed.get(), Some(20));
        assert_eq!(computed.get(), Some(20));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(computed.run_count(), 2);
    }

    #[test]
    fn repeated_reads_of_one_cell_do_not_duplicate_subscription() {
        let runtime = Runtime::new();
        let cell = Observable::new(&runtime, "test".to_string());
        let reader = cell.clone();
        let computed = Computed::new(&runtime, move || {
            format!("{}: {}", reader.get().unwrap_or_default(), reader.get().unwrap_or_default())
        });

        assert_eq!(computed.get().as_deref(), Some("test: test"));
        assert_eq!(cell.subscriber_count(), 1);
        cell.set("dupe".to_string());
        assert_eq!(computed.get().as_deref(), Some("dupe: dupe"));
    }

    #[test]
    fn computed_write_fails() {
        let runtime = Runtime::new();
        let computed = Computed::new(&runtime, || 1);
        assert!(matches!(computed.set(2), Err(Error::ComputedWrite)));
        assert_eq!(computed.get(), Some(1));
    }

    #[test]
    fn disposed_computed_returns_none_and_stops() {
        let runtime = Runtime::new();
        let source = Observable::new(&runtime, 1);
        let calls = Arc::new(AtomicI32::new(0));

        let (reader, counter) = (source.clone(), calls.clone());
        let computed = Computed::new(&runtime, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            reader.get().unwrap_or_default()
        });

        computed.dispose();
        source.set(5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(computed.get(), None);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn computed_created_inside_transaction_is_readable() {
        let runtime = Runtime::new();
        runtime.transaction(|| {
            let computed = Computed::new(&runtime, || 7);
            assert_eq!(computed.get(), Some(7));
        });
    }

    #[test]
    fn computed_created_after_parked_write_catches_up_at_commit() {
        let runtime = Runtime::new();
        let source = Observable::new(&runtime, 1);

        let computed = runtime.transaction(|| {
            source.set(2);
            let reader = source.clone();
            let computed = Computed::new(&runtime, move || reader.get().unwrap_or_default() * 10);
            // The write is still parked.
            assert_eq!(computed.get(), Some(10));
            computed
        });

        assert_eq!(source.get(), Some(2));
        assert_eq!(computed.get(), Some(20));

        source.set(3);
        assert_eq!(computed.get(), Some(30));
    }

    #[test]
    fn autorun_reading_computed_sees_fresh_value() {
        let runtime = Runtime::new();
        let source = Observable::new(&runtime, 1);
        let reader = source.clone();
        let doubled = Computed::new(&runtime, move || reader.get().unwrap_or_default() * 2);
        let seen = Arc::new(AtomicI32::new(0));

        let (view, sink) = (doubled.clone(), seen.clone());
        let _run = autorun(&runtime, move || {
            sink.store(view.get().unwrap_or_default(), Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        source.set(21);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
