//! Autorun Implementation
//!
//! An Autorun is an eager side-effecting computation that re-runs whenever a
//! cell it read last time changes.
//!
//! # How Autoruns Work
//!
//! 1. When created, the autorun runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. Each run pushes a tracker frame, unsubscribes from every cell held so
//!    far, runs the body, and subscribes to exactly the cells read during
//!    the body. A cell read only inside a branch that is no longer taken
//!    drops out of the set on the next run.
//!
//! 3. Disposal unsubscribes from the current set and makes the autorun
//!    permanently inert. Dropping the handle disposes it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::subscriber::{ReactionKind, Source, SubscriberId};

type Body = Box<dyn Fn() + Send + Sync>;

pub(crate) struct AutorunInner {
    subscriber_id: SubscriberId,
    kind: ReactionKind,
    runtime: Runtime,
    body: Body,
    dependencies: Mutex<Vec<Arc<dyn Source>>>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl AutorunInner {
    fn release_dependencies(&self) {
        let held = std::mem::take(&mut *self.dependencies.lock());
        for source in held {
            source.unsubscribe(self.subscriber_id);
        }
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.release_dependencies();
    }
}

impl Reactive for AutorunInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn kind(&self) -> ReactionKind {
        self.kind
    }

    fn run(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        let frame = self.runtime.tracker().enter(self.subscriber_id);
        self.release_dependencies();

        (self.body)();

        let collected = frame.finish();
        if self.disposed.load(Ordering::SeqCst) {
            // Disposed from inside its own body.
            return;
        }
        for source in &collected {
            source.subscribe(self.subscriber_id);
        }
        *self.dependencies.lock() = collected;
        self.run_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
/// use trellis_core::reactive::{autorun, Observable, Runtime};
///
/// let runtime = Runtime::new();
/// let count = Observable::new(&runtime, 0);
/// let seen = Arc::new(AtomicI32::new(-1));
///
/// let reader = count.clone();
/// let sink = seen.clone();
/// let _run = autorun(&runtime, move || {
///     sink.store(reader.get().unwrap_or_default(), Ordering::SeqCst);
/// });
///
/// count.set(5);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
pub struct Autorun {
    inner: Arc<AutorunInner>,
    _handle: ReactiveHandle,
}

impl Autorun {
    /// Create an autorun and run it once.
    pub fn new<F>(runtime: &Runtime, body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_kind(runtime, ReactionKind::Autorun, Box::new(body))
    }

    pub(crate) fn with_kind(runtime: &Runtime, kind: ReactionKind, body: Body) -> Self {
        let inner = Arc::new(AutorunInner {
            subscriber_id: SubscriberId::new(),
            kind,
            runtime: runtime.clone(),
            body,
            dependencies: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        let as_reactive: Arc<dyn Reactive> = inner.clone();
        let handle = runtime.register(&as_reactive);

        inner.run();

        Self {
            inner,
            _handle: handle,
        }
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    pub fn kind(&self) -> ReactionKind {
        self.inner.kind
    }

    /// Run the body now, re-collecting dependencies.
    pub fn run(&self) {
        self.inner.run();
    }

    /// Stop reacting. Safe to call more than once.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// A closure that disposes this autorun when called.
    pub fn disposer(&self) -> impl Fn() + Send + Sync + 'static {
        let inner = Arc::downgrade(&self.inner);
        move || {
            if let Some(inner) = inner.upgrade() {
                inner.dispose();
            }
        }
    }

    /// Get the number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of cells the latest run read.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl Drop for Autorun {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for Autorun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autorun")
            .field("subscriber_id", &self.inner.subscriber_id)
            .field("kind", &self.inner.kind)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an autorun. Keep the returned handle alive for as long as the
/// autorun should react; dropping it disposes the autorun.
pub fn autorun<F>(runtime: &Runtime, body: F) -> Autorun
where
    F: Fn() + Send + Sync + 'static,
{
    Autorun::new(runtime, body)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn autorun_runs_on_creation() {
        let runtime = Runtime::new();
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let run = autorun(&runtime, move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(run.run_count(), 1);
        assert_eq!(run.kind(), ReactionKind::Autorun);
    }

    #[test]
    fn autorun_reruns_when_dependency_changes() {
        let runtime = Runtime::new();
        let cell = Observable::new(&runtime, "test");
        let count = Arc::new(AtomicI32::new(0));

        let reader = cell.clone();
        let counter = count.clone();
        let run = autorun(&runtime, move || {
            let _ = reader.get();
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
        cell.set("123");
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(run.dependency_count(), 1);
    }

    #[test]
    fn autorun_stops_after_disposal() {
        let runtime = Runtime::new();
        let cell = Observable::new(&runtime, 0);
        let count = Arc::new(AtomicI32::new(0));

        let reader = cell.clone();
        let counter = count.clone();
        let run = autorun(&runtime, move || {
            let _ = reader.get();
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(1);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        run.dispose();
        run.dispose();
        assert!(run.is_disposed());
        assert_eq!(cell.subscriber_count(), 0);

        cell.set(2);
        run.run();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disposer_closure_disposes() {
        let runtime = Runtime::new();
        let cell = Observable::new(&runtime, 0);
        let reader = cell.clone();
        let run = autorun(&runtime, move || {
            let _ = reader.get();
        });

        let dispose = run.disposer();
        dispose();
        assert!(run.is_disposed());
        assert!(!cell.has_observers());
    }

    #[test]
    fn dropping_handle_unsubscribes() {
        let runtime = Runtime::new();
        let cell = Observable::new(&runtime, 0);
        let reader = cell.clone();
        {
            let _run = autorun(&runtime, move || {
                let _ = reader.get();
            });
            assert_eq!(cell.subscriber_count(), 1);
        }
        assert_eq!(cell.subscriber_count(), 0);
        assert_eq!(runtime.reaction_count(), 0);
    }

    #[test]
    fn conditional_dependency_is_dropped() {
        let runtime = Runtime::new();
        let flag = Observable::new(&runtime, true);
        let a = Observable::new(&runtime, 0);
        let b = Observable::new(&runtime, 0);
        let count = Arc::new(AtomicI32::new(0));

        let (f, ra, rb, counter) = (flag.clone(), a.clone(), b.clone(), count.clone());
        let run = autorun(&runtime, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = ra.get();
            if f.get() == Some(true) {
                let _ = rb.get();
            }
        });
        assert_eq!(run.dependency_count(), 3);

        b.set(1);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        flag.set(false);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(run.dependency_count(), 2);

        b.set(2);
        b.set(3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(b.subscriber_count(), 0);
    }

    #[test]
    fn autorun_created_after_parked_write_reruns_at_commit() {
        let runtime = Runtime::new();
        let cell = Observable::new(&runtime, 1);
        let seen = Arc::new(AtomicI32::new(0));
        let runs = Arc::new(AtomicI32::new(0));

        let run = runtime.transaction(|| {
            cell.set(2);
            let (reader, sink, counter) = (cell.clone(), seen.clone(), runs.clone());
            autorun(&runtime, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                sink.store(reader.get().unwrap_or_default(), Ordering::SeqCst);
            })
        });

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(run.dependency_count(), 1);
    }

    #[test]
    fn commit_runs_existing_subscriber_once() {
        let runtime = Runtime::new();
        let cell = Observable::new(&runtime, 0);
        let runs = Arc::new(AtomicI32::new(0));

        let (reader, counter) = (cell.clone(), runs.clone());
        let _run = autorun(&runtime, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = reader.get();
        });

        runtime.transaction(|| {
            cell.set(1);
            cell.set(2);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
