//! Array Mutators
//!
//! Observables holding arrays get the structural mutators of a JS array.
//! Each mutator copies the latest value, mutates the copy and writes it back
//! through [`Observable::set`], so a mutation follows exactly the notify path
//! of a whole-value replace. Only whole-array replacement is ever reported;
//! there is no per-element diff.

use serde_json::Value;

use super::observable::Observable;
use crate::error::{Error, Result};

/// A value that may hold a vector of items.
pub trait ArrayValue: Clone + Send + Sync + 'static {
    type Item: Clone;

    fn as_vec_mut(&mut self) -> Option<&mut Vec<Self::Item>>;
}

impl<T> ArrayValue for Vec<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn as_vec_mut(&mut self) -> Option<&mut Vec<T>> {
        Some(self)
    }
}

impl ArrayValue for Value {
    type Item = Value;

    fn as_vec_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.as_array_mut()
    }
}

/// Resolve a JS-style relative index against `len`.
fn relative(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        (index as usize).min(len)
    }
}

impl<T> Observable<T>
where
    T: ArrayValue,
{
    /// Apply `f` to a copy of the latest array and write the copy back.
    pub fn mutate_array<R>(&self, f: impl FnOnce(&mut Vec<T::Item>) -> R) -> Result<R> {
        let mut value = self.latest().ok_or(Error::Disposed)?;
        let items = value.as_vec_mut().ok_or(Error::NotAnArray)?;
        let out = f(items);
        self.set(value);
        Ok(out)
    }

    /// Append an item, returning the new length.
    pub fn push(&self, item: T::Item) -> Result<usize> {
        self.mutate_array(|items| {
            items.push(item);
            items.len()
        })
    }

    pub fn pop(&self) -> Result<Option<T::Item>> {
        self.mutate_array(|items| items.pop())
    }

    /// Remove the first item.
    pub fn shift(&self) -> Result<Option<T::Item>> {
        self.mutate_array(|items| {
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        })
    }

    /// Prepend items, keeping their order, returning the new length.
    pub fn unshift(&self, new_items: Vec<T::Item>) -> Result<usize> {
        self.mutate_array(|items| {
            items.splice(0..0, new_items);
            items.len()
        })
    }

    /// Remove `delete_count` items starting at `start` and insert
    /// `insert` in their place. A negative `start` counts from the end.
    /// Returns the removed items.
    pub fn splice(&self, start: isize, delete_count: usize, insert: Vec<T::Item>) -> Result<Vec<T::Item>> {
        self.mutate_array(|items| {
            let from = relative(start, items.len());
            let to = from.saturating_add(delete_count).min(items.len());
            items.splice(from..to, insert).collect()
        })
    }

    pub fn reverse(&self) -> Result<()> {
        self.mutate_array(|items| items.reverse())
    }

    /// Copy `start..end` to `target` inside the same array, without
    /// changing its length. Indexes follow the JS relative-index rules.
    pub fn copy_within(&self, target: isize, start: isize, end: Option<isize>) -> Result<()> {
        self.mutate_array(|items| {
            let len = items.len();
            let to = relative(target, len);
            let from = relative(start, len);
            let until = end.map(|e| relative(e, len)).unwrap_or(len);
            let count = until.saturating_sub(from).min(len - to);
            if count > 0 {
                let copied: Vec<T::Item> = items[from..from + count].to_vec();
                items[to..to + count].clone_from_slice(&copied);
            }
        })
    }
}
