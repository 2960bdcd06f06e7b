//! Trellis Core
//!
//! This crate provides the core runtime for Trellis, a reactive
//! state-management library. It implements:
//!
//! - Reactive primitives (observables, computeds, autoruns, actions)
//! - A transaction coordinator that batches writes and reconciles effects
//! - Stores: keyed object trees over those primitives with snapshots
//! - A JSON Patch (RFC 6902) engine for inbound and outbound deltas
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: dependency tracking, the runtime and its scheduler
//! - `store`: dynamic key classification, snapshot/restore, patch emission
//! - `patch`: paths, operations, application and wire encodings
//! - `config`: runtime tunables
//! - `error`: the crate-wide error type
//!
//! Every reactive value belongs to an explicit [`Runtime`]. Values created
//! against the same runtime batch together; separate runtimes never interact.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//! use trellis_core::patch::PatchOp;
//! use trellis_core::store::{PatchListener, Store};
//! use trellis_core::Runtime;
//!
//! let runtime = Runtime::new();
//! let store = Store::from_value(&runtime, json!({"count": 0})).unwrap();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let listener: PatchListener = Arc::new(move |ops: &[PatchOp]| {
//!     sink.lock().unwrap().extend_from_slice(ops);
//! });
//! store.register(&listener);
//!
//! store.set("count", 1).unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec![PatchOp::add(["count"], 1)]);
//! ```

pub mod config;
pub mod error;
pub mod patch;
pub mod reactive;
pub mod store;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use reactive::{action, autorun, Action, Autorun, Computed, Observable, Runtime};
pub use store::{Field, Slot, Store};
