//! Identity types for the reactive graph.
//!
//! Cells (observables and the backing cells of computeds) are *sources*;
//! autoruns (including the ones driving computeds) are *subscribers*. Both
//! sides are identified by process-unique ids so subscription sets and
//! scheduler queues can dedupe without comparing closures.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Each reaction (plain autorun or the one driving a computed) gets a unique
/// ID when created. This ID is used to track dependencies and avoid duplicate
/// subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a reactive cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a reaction drives. The tag is fixed at construction and decides which
/// scheduler queue the reaction waits in during a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    /// The reaction recomputes a computed value's backing cell.
    Computed,

    /// A plain side-effecting autorun.
    Autorun,
}

/// A cell that reactions can depend on.
///
/// Implemented by the shared interior of an observable. The runtime only
/// ever sees cells through this trait, which keeps it independent of the
/// cell's value type.
pub(crate) trait Source: Send + Sync {
    fn source_id(&self) -> SourceId;

    /// Add a subscriber. Adding the same subscriber twice is a no-op.
    fn subscribe(&self, subscriber: SubscriberId);

    fn unsubscribe(&self, subscriber: SubscriberId);

    /// Move a value written during a transaction into the committed slot.
    fn commit_pending(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn source_ids_are_monotonic() {
        let first = SourceId::new();
        let second = SourceId::new();
        assert!(second.raw() > first.raw());
    }
}
