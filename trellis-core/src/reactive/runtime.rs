//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects observables,
//! computeds, autoruns and actions. One runtime owns:
//!
//! - the dependency tracker (stack of running reactions),
//! - the reaction registry (subscriber id to weak reaction),
//! - the transaction scheduler (depth counter, effect queues, commit hooks).
//!
//! # How It Works
//!
//! 1. A reaction registers with the runtime and receives a handle; dropping
//!    the handle unregisters it.
//!
//! 2. Reading a cell while a reaction runs records the cell in the
//!    reaction's tracker frame.
//!
//! 3. Writing a cell notifies its subscribers through the runtime:
//!    a. outside a transaction each subscriber runs synchronously,
//!    b. inside one it is queued and the commit loop runs it later.
//!
//! # Isolation
//!
//! Nothing here is global. Every primitive is created against an explicit
//! runtime handle, so separate runtimes never batch together and tests can
//! assert ordering without cross-test leakage.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::context::Tracker;
use super::scheduler::{HookKey, Step, TransactionState};
use super::subscriber::{ReactionKind, Source, SubscriberId};
use crate::config::RuntimeConfig;

/// A trait for computations that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reaction.
    fn subscriber_id(&self) -> SubscriberId;

    /// Whether this reaction drives a computed or is a plain autorun.
    fn kind(&self) -> ReactionKind;

    /// Re-run the reaction.
    fn run(&self);
}

/// Handle to a registered reaction.
///
/// Dropping this handle unregisters the reaction from the runtime.
pub struct ReactiveHandle {
    runtime: Runtime,
    subscriber_id: SubscriberId,
}

impl ReactiveHandle {
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        self.runtime.unregister(self.subscriber_id);
    }
}

struct RuntimeInner {
    config: RuntimeConfig,
    tracker: Tracker,
    registry: DashMap<SubscriberId, Weak<dyn Reactive>>,
    transaction: Mutex<TransactionState>,
    cycle_aborts: AtomicUsize,
    commits: AtomicU64,
}

/// The reactive runtime.
///
/// Cloning is cheap and yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let bound = config.effective_guard();
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                tracker: Tracker::new(),
                registry: DashMap::new(),
                transaction: Mutex::new(TransactionState::new(bound)),
                cycle_aborts: AtomicUsize::new(0),
                commits: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether two handles point at the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a reaction with the runtime.
    ///
    /// Returns a handle that unregisters the reaction when dropped.
    pub fn register(&self, reactive: &Arc<dyn Reactive>) -> ReactiveHandle {
        let id = reactive.subscriber_id();
        self.inner.registry.insert(id, Arc::downgrade(reactive));
        ReactiveHandle {
            runtime: self.clone(),
            subscriber_id: id,
        }
    }

    fn unregister(&self, id: SubscriberId) {
        self.inner.registry.remove(&id);
    }

    fn lookup(&self, id: SubscriberId) -> Option<Arc<dyn Reactive>> {
        self.inner
            .registry
            .get(&id)
            .and_then(|entry| entry.value().upgrade())
    }

    /// Number of live registered reactions.
    pub fn reaction_count(&self) -> usize {
        self.inner
            .registry
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    // ------------------------------------------------------------------
    // Dependency tracking
    // ------------------------------------------------------------------

    pub(crate) fn tracker(&self) -> &Tracker {
        &self.inner.tracker
    }

    pub(crate) fn track(&self, source: Arc<dyn Source>) {
        self.inner.tracker.track(source);
    }

    /// Check if a reaction is currently collecting dependencies.
    pub fn is_tracking(&self) -> bool {
        self.inner.tracker.is_tracking()
    }

    /// The reaction currently collecting dependencies, if any.
    pub fn current_subscriber(&self) -> Option<SubscriberId> {
        self.inner.tracker.current()
    }

    /// Run `f` without registering any of its reads as dependencies.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _barrier = self.inner.tracker.barrier();
        f()
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    /// Notify the given subscribers that a cell changed.
    ///
    /// Outside a transaction each live subscriber runs immediately; inside
    /// one it is moved to the back of its queue.
    pub(crate) fn notify(&self, subscribers: &[SubscriberId]) {
        for &id in subscribers {
            let Some(reaction) = self.lookup(id) else {
                continue;
            };
            {
                let mut state = self.inner.transaction.lock();
                if state.depth() > 0 {
                    trace!(subscriber = id.raw(), kind = ?reaction.kind(), "reaction scheduled");
                    state.schedule(id, Arc::downgrade(&reaction), reaction.kind());
                    continue;
                }
            }
            reaction.run();
        }
    }

    pub(crate) fn queue_write(&self, source: Arc<dyn Source>) {
        self.inner.transaction.lock().queue_write(source);
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Whether an action scope is open.
    pub fn in_transaction(&self) -> bool {
        self.depth() > 0
    }

    /// Current reentrancy depth of action scopes.
    pub fn depth(&self) -> usize {
        self.inner.transaction.lock().depth()
    }

    /// Run `f` as an action scope.
    ///
    /// Writes inside the scope are parked and reactions are queued. When the
    /// outermost scope exits, the queues are reconciled to a fixed point and
    /// deferred commit hooks fire once each.
    pub fn transaction<R>(&self, f: impl FnOnce() -> R) -> R {
        let depth = self.inner.transaction.lock().enter();
        trace!(depth, "transaction entered");
        let scope = TransactionScope {
            runtime: self,
            finished: false,
        };
        let result = f();
        scope.finish();
        result
    }

    /// Run `hook` once after the current outer transaction commits, or
    /// right away when no transaction is open. Hooks sharing `key` within
    /// one transaction collapse into the first one.
    pub fn defer_commit(&self, key: HookKey, hook: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.inner.transaction.lock();
            if state.depth() > 0 {
                state.defer(key, Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// How many commits were cut short by the cycle guard.
    pub fn cycle_aborts(&self) -> usize {
        self.inner.cycle_aborts.load(Ordering::Relaxed)
    }

    /// How many outer transactions have committed.
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::Relaxed)
    }

    /// Drain the effect queues to a fixed point. Runs while depth is still
    /// one, so effects produced here are deferred in turn.
    fn commit(&self) {
        let mut steps = 0usize;
        loop {
            let step = self.inner.transaction.lock().next_step();
            match step {
                Step::Apply(source) => source.commit_pending(),
                Step::Run(reaction) => reaction.run(),
                Step::Idle => break,
                Step::Abort => {
                    let (observables, computeds, autoruns) =
                        self.inner.transaction.lock().pending_counts();
                    let leftover = self.inner.transaction.lock().abort();
                    for source in leftover {
                        source.commit_pending();
                    }
                    // Applying the leftovers queued their subscribers again.
                    self.inner.transaction.lock().abort();
                    self.inner.cycle_aborts.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        bound = self.inner.config.effective_guard(),
                        observables, computeds, autoruns,
                        "circular dependency detected, aborting commit"
                    );
                    break;
                }
            }
            steps += 1;
        }
        self.inner.transaction.lock().reset_guard();
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
        debug!(steps, "transaction committed");
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("depth", &self.depth())
            .field("reactions", &self.inner.registry.len())
            .field("cycle_aborts", &self.cycle_aborts())
            .finish()
    }
}

/// Closes an action scope. A scope dropped without `finish` (the body
/// panicked) discards whatever the outer transaction had queued.
struct TransactionScope<'a> {
    runtime: &'a Runtime,
    finished: bool,
}

impl TransactionScope<'_> {
    fn finish(mut self) {
        self.finished = true;
        if self.runtime.depth() == 1 {
            self.runtime.commit();
        }
        let hooks = self.runtime.inner.transaction.lock().exit();
        for hook in hooks {
            hook();
        }
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.runtime.inner.transaction.lock();
        state.exit();
        if state.depth() == 0 {
            state.clear();
        }
    }
}
