//! Reactive Primitives
//!
//! This module implements the dependency engine and the transaction
//! coordinator: observables, computeds, autoruns and actions, all bound to an
//! explicit [`Runtime`].
//!
//! # Concepts
//!
//! ## Observables
//!
//! An Observable is a container for mutable state. When it is read while a
//! reaction runs, the reaction comes to depend on it. When its value changes,
//! every dependent reaction is notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value held in a backing observable and refreshed
//! by a dedicated autorun. Reads return the cached value.
//!
//! ## Autoruns
//!
//! An Autorun is an eager side-effecting computation. After every run its
//! subscriptions equal exactly the cells it read during that run.
//!
//! ## Actions
//!
//! An Action runs its body as a transaction. Effects are deferred into
//! ordered queues and reconciled to a fixed point when the outermost action
//! exits.
//!
//! # Implementation Notes
//!
//! Everything is synchronous. All apparent concurrency is reentrancy: nested
//! actions and reactions triggered from inside other reactions. Locks are
//! only held for bookkeeping and never while user code runs.

mod action;
mod array;
mod autorun;
mod computed;
mod context;
mod observable;
mod runtime;
mod scheduler;
mod subscriber;

pub use action::{action, Action};
pub use array::ArrayValue;
pub use autorun::{autorun, Autorun};
pub use computed::Computed;
pub use observable::Observable;
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use scheduler::HookKey;
pub use subscriber::{ReactionKind, SourceId, SubscriberId};
