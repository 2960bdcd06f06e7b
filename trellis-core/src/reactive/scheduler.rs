//! Transaction Scheduler
//!
//! The scheduler holds the state shared by every action on a runtime: the
//! reentrancy depth and three ordered effect queues.
//!
//! # Algorithm
//!
//! While depth is non-zero, writes and notifications are deferred:
//!
//! 1. A write parks its value on the cell and queues the cell once
//!    (coalescing: the last write wins, the first queue position is kept).
//! 2. A notified reaction is moved to the back of its queue (computed or
//!    autorun), so each reaction appears at most once.
//!
//! When the outermost action exits, the commit loop repeatedly picks one step:
//!
//! - drain the whole observable queue, FIFO, applying parked values;
//! - otherwise run the first queued computed;
//! - otherwise run the first queued autorun.
//!
//! Running a reaction may queue more work, so the loop continues to a fixed
//! point. A guard counter bounds it: draining a reaction queue that holds
//! exactly one entry costs one unit, and an empty budget with work left
//! aborts the commit.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use super::runtime::Reactive;
use super::subscriber::{ReactionKind, Source, SourceId, SubscriberId};

/// Key identifying a deferred commit hook. Hooks sharing a key run once.
pub type HookKey = u64;

pub(crate) type CommitHook = Box<dyn FnOnce() + Send>;

struct Scheduled {
    id: SubscriberId,
    reaction: Weak<dyn Reactive>,
}

/// One unit of work picked by the commit loop.
pub(crate) enum Step {
    Apply(Arc<dyn Source>),
    Run(Arc<dyn Reactive>),
    /// All queues are empty.
    Idle,
    /// Work is left but the cycle guard is spent.
    Abort,
}

/// Process-wide batching state of one runtime.
pub(crate) struct TransactionState {
    depth: usize,
    observables: VecDeque<Arc<dyn Source>>,
    queued: HashSet<SourceId>,
    computeds: VecDeque<Scheduled>,
    autoruns: VecDeque<Scheduled>,
    hooks: IndexMap<HookKey, CommitHook>,
    guard: usize,
    bound: usize,
}

impl TransactionState {
    pub(crate) fn new(bound: usize) -> Self {
        Self {
            depth: 0,
            observables: VecDeque::new(),
            queued: HashSet::new(),
            computeds: VecDeque::new(),
            autoruns: VecDeque::new(),
            hooks: IndexMap::new(),
            guard: bound,
            bound,
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// Increment the depth and return the new value.
    pub(crate) fn enter(&mut self) -> usize {
        self.depth += 1;
        self.depth
    }

    /// Decrement the depth. Returns the hooks to run if this closed the
    /// outermost scope.
    pub(crate) fn exit(&mut self) -> Vec<CommitHook> {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.hooks.drain(..).map(|(_, hook)| hook).collect()
        } else {
            Vec::new()
        }
    }

    /// Queue a cell whose pending value must be applied at commit.
    pub(crate) fn queue_write(&mut self, source: Arc<dyn Source>) {
        if self.queued.insert(source.source_id()) {
            self.observables.push_back(source);
        }
    }

    /// Queue a reaction, moving it to the back if it was already waiting.
    pub(crate) fn schedule(&mut self, id: SubscriberId, reaction: Weak<dyn Reactive>, kind: ReactionKind) {
        let queue = match kind {
            ReactionKind::Computed => &mut self.computeds,
            ReactionKind::Autorun => &mut self.autoruns,
        };
        queue.retain(|scheduled| scheduled.id != id);
        queue.push_back(Scheduled { id, reaction });
    }

    /// Register a hook for the end of the outer commit. The first hook
    /// registered under a key wins.
    pub(crate) fn defer(&mut self, key: HookKey, hook: CommitHook) {
        self.hooks.entry(key).or_insert(hook);
    }

    pub(crate) fn has_work(&self) -> bool {
        !self.observables.is_empty() || !self.computeds.is_empty() || !self.autoruns.is_empty()
    }

    pub(crate) fn pending_counts(&self) -> (usize, usize, usize) {
        (self.observables.len(), self.computeds.len(), self.autoruns.len())
    }

    pub(crate) fn next_step(&mut self) -> Step {
        if !self.has_work() {
            return Step::Idle;
        }
        if self.guard == 0 {
            return Step::Abort;
        }
        if let Some(source) = self.observables.pop_front() {
            self.queued.remove(&source.source_id());
            return Step::Apply(source);
        }
        if let Some(reaction) = Self::pop_reaction(&mut self.computeds, &mut self.guard) {
            return Step::Run(reaction);
        }
        if let Some(reaction) = Self::pop_reaction(&mut self.autoruns, &mut self.guard) {
            return Step::Run(reaction);
        }
        // Only dead reactions were queued.
        Step::Idle
    }

    fn pop_reaction(queue: &mut VecDeque<Scheduled>, guard: &mut usize) -> Option<Arc<dyn Reactive>> {
        while let Some(scheduled) = queue.pop_front() {
            if queue.is_empty() {
                *guard = guard.saturating_sub(1);
            }
            if let Some(reaction) = scheduled.reaction.upgrade() {
                return Some(reaction);
            }
        }
        None
    }

    /// Drop queued reactions after a guard abort and hand back the cells
    /// whose parked values still need applying.
    pub(crate) fn abort(&mut self) -> Vec<Arc<dyn Source>> {
        self.computeds.clear();
        self.autoruns.clear();
        self.queued.clear();
        self.observables.drain(..).collect()
    }

    pub(crate) fn reset_guard(&mut self) {
        self.guard = self.bound;
    }

    /// Forget everything queued. Used when a transaction body panics.
    pub(crate) fn clear(&mut self) {
        self.observables.clear();
        self.queued.clear();
        self.computeds.clear();
        self.autoruns.clear();
        self.hooks.clear();
        self.guard = self.bound;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        id: SourceId,
        commits: AtomicUsize,
    }

    impl Source for CountingSource {
        fn source_id(&self) -> SourceId {
            self.id
        }
        fn subscribe(&self, _subscriber: SubscriberId) {}
        fn unsubscribe(&self, _subscriber: SubscriberId) {}
        fn commit_pending(&self) {
            self.commits.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NoopReaction {
        id: SubscriberId,
        kind: ReactionKind,
    }

    impl Reactive for NoopReaction {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }
        fn kind(&self) -> ReactionKind {
            self.kind
        }
        fn run(&self) {}
    }

    fn reaction(kind: ReactionKind) -> Arc<dyn Reactive> {
        Arc::new(NoopReaction {
            id: SubscriberId::new(),
            kind,
        })
    }

    fn run_id(step: Step) -> Option<SubscriberId> {
        match step {
            Step::Run(reaction) => Some(reaction.subscriber_id()),
            _ => None,
        }
    }

    #[test]
    fn writes_to_the_same_cell_queue_once() {
        let mut state = TransactionState::new(10);
        let source: Arc<dyn Source> = Arc::new(CountingSource {
            id: SourceId::new(),
            commits: AtomicUsize::new(0),
        });

        state.queue_write(source.clone());
        state.queue_write(source.clone());
        state.queue_write(source);

        assert_eq!(state.pending_counts(), (1, 0, 0));
    }

    #[test]
    fn rescheduling_moves_reaction_to_back() {
        let mut state = TransactionState::new(10);
        let a = reaction(ReactionKind::Autorun);
        let b = reaction(ReactionKind::Autorun);

        state.schedule(a.subscriber_id(), Arc::downgrade(&a), a.kind());
        state.schedule(b.subscriber_id(), Arc::downgrade(&b), b.kind());
        state.schedule(a.subscriber_id(), Arc::downgrade(&a), a.kind());

        assert_eq!(state.pending_counts(), (0, 0, 2));
        assert_eq!(run_id(state.next_step()), Some(b.subscriber_id()));
        assert_eq!(run_id(state.next_step()), Some(a.subscriber_id()));
        assert!(matches!(state.next_step(), Step::Idle));
    }

    #[test]
    fn observables_drain_before_computeds_before_autoruns() {
        let mut state = TransactionState::new(10);
        let autorun = reaction(ReactionKind::Autorun);
        let computed = reaction(ReactionKind::Computed);
        let source: Arc<dyn Source> = Arc::new(CountingSource {
            id: SourceId::new(),
            commits: AtomicUsize::new(0),
        });

        state.schedule(autorun.subscriber_id(), Arc::downgrade(&autorun), autorun.kind());
        state.schedule(computed.subscriber_id(), Arc::downgrade(&computed), computed.kind());
        state.queue_write(source);

        assert!(matches!(state.next_step(), Step::Apply(_)));
        assert_eq!(run_id(state.next_step()), Some(computed.subscriber_id()));
        assert_eq!(run_id(state.next_step()), Some(autorun.subscriber_id()));
    }

    #[test]
    fn guard_spends_only_on_single_entry_queues() {
        let mut state = TransactionState::new(1);
        let a = reaction(ReactionKind::Computed);
        let b = reaction(ReactionKind::Computed);
        state.schedule(a.subscriber_id(), Arc::downgrade(&a), a.kind());
        state.schedule(b.subscriber_id(), Arc::downgrade(&b), b.kind());

        // Two pending: no cost.
        assert!(run_id(state.next_step()).is_some());
        // One pending: spends the last unit.
        assert!(run_id(state.next_step()).is_some());

        state.schedule(a.subscriber_id(), Arc::downgrade(&a), a.kind());
        assert!(matches!(state.next_step(), Step::Abort));

        assert!(state.abort().is_empty());
        state.reset_guard();
        assert!(matches!(state.next_step(), Step::Idle));
    }

    #[test]
    fn dead_reactions_are_skipped() {
        let mut state = TransactionState::new(10);
        {
            let gone = reaction(ReactionKind::Autorun);
            state.schedule(gone.subscriber_id(), Arc::downgrade(&gone), gone.kind());
        }
        assert!(matches!(state.next_step(), Step::Idle));
    }

    #[test]
    fn hooks_run_once_per_key_on_outer_exit() {
        let mut state = TransactionState::new(10);
        state.enter();
        state.enter();
        state.defer(1, Box::new(|| {}));
        state.defer(1, Box::new(|| {}));
        state.defer(2, Box::new(|| {}));

        assert!(state.exit().is_empty());
        assert_eq!(state.exit().len(), 2);
        assert_eq!(state.depth(), 0);
    }
}
