//! Dependency Tracker
//!
//! The tracker records which cells a reaction reads while it runs. It is a
//! stack of frames: running a reaction pushes a frame, every tracked read
//! registers the cell against the top frame, and finishing the run pops the
//! frame and hands back exactly the cells that were read.
//!
//! # Implementation
//!
//! The stack lives inside a [`Runtime`](super::Runtime) rather than in a
//! thread-local, so isolated runtimes never observe each other's frames.
//! Nested frames are the normal case: an autorun that reads a computed may
//! trigger that computed's first evaluation, which pushes its own frame.
//!
//! Untracked reads push a barrier frame with no owner. Reads land in the
//! barrier and are discarded, while reactions started inside it still get
//! their own frames on top.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::subscriber::{Source, SourceId, SubscriberId};

/// An entry in the tracker stack.
struct Frame {
    /// The reaction collecting dependencies, or `None` for an untracked barrier.
    owner: Option<SubscriberId>,
    /// Cells read during this frame, in first-read order.
    dependencies: IndexMap<SourceId, Arc<dyn Source>>,
}

/// Stack of currently running reactions.
#[derive(Default)]
pub(crate) struct Tracker {
    stack: Mutex<Vec<Frame>>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Push a frame for `owner`. The frame is popped when the guard finishes
    /// or is dropped, so a panicking reaction does not leave it behind.
    pub(crate) fn enter(&self, owner: SubscriberId) -> FrameGuard<'_> {
        self.push(Some(owner))
    }

    /// Push a barrier frame that swallows reads.
    pub(crate) fn barrier(&self) -> FrameGuard<'_> {
        self.push(None)
    }

    fn push(&self, owner: Option<SubscriberId>) -> FrameGuard<'_> {
        self.stack.lock().push(Frame {
            owner,
            dependencies: IndexMap::new(),
        });
        FrameGuard {
            tracker: self,
            owner,
            done: false,
        }
    }

    /// Register `source` against the top frame, if any.
    pub(crate) fn track(&self, source: Arc<dyn Source>) {
        let mut stack = self.stack.lock();
        if let Some(frame) = stack.last_mut() {
            frame.dependencies.entry(source.source_id()).or_insert(source);
        }
    }

    /// Whether reads are currently being recorded for a reaction.
    pub(crate) fn is_tracking(&self) -> bool {
        self.stack
            .lock()
            .last()
            .is_some_and(|frame| frame.owner.is_some())
    }

    /// The reaction owning the top frame.
    pub(crate) fn current(&self) -> Option<SubscriberId> {
        self.stack.lock().last().and_then(|frame| frame.owner)
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    fn pop(&self, owner: Option<SubscriberId>) -> Vec<Arc<dyn Source>> {
        let popped = self.stack.lock().pop();
        match popped {
            Some(frame) => {
                debug_assert_eq!(
                    frame.owner, owner,
                    "tracker frame mismatch: expected {:?}, got {:?}",
                    owner, frame.owner
                );
                frame.dependencies.into_values().collect()
            }
            None => Vec::new(),
        }
    }
}

/// Guard that pops its frame when finished or dropped.
pub(crate) struct FrameGuard<'a> {
    tracker: &'a Tracker,
    owner: Option<SubscriberId>,
    done: bool,
}

impl FrameGuard<'_> {
    /// Pop the frame and return the cells read while it was on top.
    pub(crate) fn finish(mut self) -> Vec<Arc<dyn Source>> {
        self.done = true;
        self.tracker.pop(self.owner)
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.tracker.pop(self.owner);
        }
    }
}
