//! Observable Implementation
//!
//! An Observable is the fundamental reactive primitive: a mutable cell that
//! tracks which reactions read it.
//!
//! # How Observables Work
//!
//! 1. Reading an observable while a reaction runs registers the cell in the
//!    reaction's tracker frame. The reaction subscribes once its run ends.
//!
//! 2. Writing stores the value and notifies every subscriber. Outside a
//!    transaction the store is immediate; inside one the value is parked on
//!    the cell and applied when the outer transaction commits. A second write
//!    in the same transaction replaces the parked value.
//!
//! 3. Disposing flushes the subscriber set and makes the cell inert: reads
//!    return `None`, writes are ignored.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};

use super::runtime::Runtime;
use super::subscriber::{Source, SourceId, SubscriberId};

/// Shared interior of an observable.
struct CellInner<T> {
    id: SourceId,
    runtime: Runtime,
    /// The committed value. `None` once disposed, or for a computed's
    /// backing cell before its first evaluation.
    value: RwLock<Option<T>>,
    /// Value written inside a transaction, waiting for commit.
    pending: Mutex<Option<T>>,
    subscribers: Mutex<IndexSet<SubscriberId>>,
    disposed: AtomicBool,
}

impl<T> Source for CellInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn subscribe(&self, subscriber: SubscriberId) {
        if !self.disposed.load(Ordering::SeqCst) {
            self.subscribers.lock().insert(subscriber);
        }
    }

    fn unsubscribe(&self, subscriber: SubscriberId) {
        self.subscribers.lock().shift_remove(&subscriber);
    }

    fn commit_pending(&self) {
        let pending = self.pending.lock().take();
        let Some(value) = pending else {
            return;
        };
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        *self.value.write() = Some(value);
        // Reactions created after the write read the old value.
        self.notify();
    }
}

impl<T> CellInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn notify(&self) {
        let subscribers: Vec<SubscriberId> = self.subscribers.lock().iter().copied().collect();
        if !subscribers.is_empty() {
            self.runtime.notify(&subscribers);
        }
    }
}

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Observable, Runtime};
///
/// let runtime = Runtime::new();
/// let count = Observable::new(&runtime, 0);
///
/// count.set(5);
/// assert_eq!(count.get(), Some(5));
/// ```
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<CellInner<T>>,
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new observable with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self::with_slot(runtime, Some(value))
    }

    /// A cell with no value yet. Used as the backing cell of a computed.
    pub(crate) fn empty(runtime: &Runtime) -> Self {
        Self::with_slot(runtime, None)
    }

    fn with_slot(runtime: &Runtime, value: Option<T>) -> Self {
        Self {
            inner: Arc::new(CellInner {
                id: SourceId::new(),
                runtime: runtime.clone(),
                value: RwLock::new(value),
                pending: Mutex::new(None),
                subscribers: Mutex::new(IndexSet::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Get the committed value.
    ///
    /// If called while a reaction runs, the reaction comes to depend on this
    /// cell. Returns `None` after disposal.
    pub fn get(&self) -> Option<T> {
        if self.is_disposed() {
            return None;
        }
        self.inner.runtime.track(self.inner.clone());
        self.inner.value.read().clone()
    }

    /// Get the committed value without registering a dependency.
    pub fn get_untracked(&self) -> Option<T> {
        if self.is_disposed() {
            return None;
        }
        self.inner.value.read().clone()
    }

    /// The value a commit would leave behind: the parked value if a
    /// transaction wrote one, otherwise the committed value. Untracked.
    pub fn latest(&self) -> Option<T> {
        if self.is_disposed() {
            return None;
        }
        if let Some(pending) = self.inner.pending.lock().clone() {
            return Some(pending);
        }
        self.inner.value.read().clone()
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        if self.is_disposed() {
            return;
        }
        if self.inner.runtime.in_transaction() {
            *self.inner.pending.lock() = Some(value);
            self.inner.runtime.queue_write(self.inner.clone());
        } else {
            *self.inner.value.write() = Some(value);
        }
        self.notify_subscribers();
    }

    /// Store a value directly, bypassing any open transaction, without
    /// notifying. Only valid while nothing can observe the cell yet.
    pub(crate) fn init(&self, value: T) {
        if !self.is_disposed() {
            *self.inner.value.write() = Some(value);
        }
    }

    /// Update the value using a function of the latest value.
    ///
    /// Does nothing on a disposed or still-empty cell.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        if let Some(current) = self.latest() {
            self.set(f(&current));
        }
    }

    fn notify_subscribers(&self) {
        self.inner.notify();
    }

    /// Make the cell permanently inert and drop every subscriber.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        *self.inner.value.write() = None;
        *self.inner.pending.lock() = None;
        self.inner.subscribers.lock().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Whether at least one reaction currently depends on this cell.
    pub fn has_observers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Whether two handles share the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Observable<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
