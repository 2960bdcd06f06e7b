//! Actions
//!
//! An action is a callable that runs its body as a transaction. Actions nest:
//! only the outermost one commits, so every write made by the whole call
//! tree becomes visible at once.

use std::fmt;
use std::sync::Arc;

use super::runtime::Runtime;

/// A batched mutation scope bound to a runtime.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Action, Observable, Runtime};
///
/// let runtime = Runtime::new();
/// let first = Observable::new(&runtime, "Andy");
/// let last = Observable::new(&runtime, "Johnson");
///
/// let (f, l) = (first.clone(), last.clone());
/// let rename = Action::new(&runtime, move |(a, b): (&'static str, &'static str)| {
///     f.set(a);
///     l.set(b);
/// });
///
/// rename.call(("John", "Doe"));
/// assert_eq!(first.get(), Some("John"));
/// ```
pub struct Action<A, R = ()> {
    runtime: Runtime,
    body: Arc<dyn Fn(A) -> R + Send + Sync>,
}

impl<A, R> Action<A, R> {
    pub fn new<F>(runtime: &Runtime, body: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self {
            runtime: runtime.clone(),
            body: Arc::new(body),
        }
    }

    /// Run the body inside a transaction and return its result.
    pub fn call(&self, args: A) -> R {
        self.runtime.transaction(|| (self.body)(args))
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl<A, R> Clone for Action<A, R> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            body: Arc::clone(&self.body),
        }
    }
}

impl<A, R> fmt::Debug for Action<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").finish_non_exhaustive()
    }
}

/// Build an action from a closure.
pub fn action<A, R, F>(runtime: &Runtime, body: F) -> Action<A, R>
where
    F: Fn(A) -> R + Send + Sync + 'static,
{
    Action::new(runtime, body)
}
