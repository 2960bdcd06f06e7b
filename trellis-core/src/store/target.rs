//! Stores as patch targets.
//!
//! Paths descend through nested stores key by key. Once a path reaches an
//! observable or unobserved entry, the rest of it addresses the entry's JSON
//! value: the value is copied, edited and written back as a whole.

use serde_json::Value;

use super::entry::{is_reserved, Entry};
use super::snapshot::Read;
use super::{Slot, Store};
use crate::patch::{add_at, read_at, remove_at, Path, PatchTarget};

impl Store {
    fn read_segments(&self, segments: &[String]) -> Option<Value> {
        let Some((key, rest)) = segments.split_first() else {
            return Some(self.materialize(Read::Latest));
        };
        if is_reserved(key) {
            return None;
        }
        match self.lookup(key)? {
            Entry::Store(child) => child.read_segments(rest),
            Entry::Observable(cell) => read_at(&cell.latest()?, rest).cloned(),
            Entry::Unobserved(value) => read_at(&value, rest).cloned(),
            Entry::Computed(computed) => read_at(&computed.get_untracked()?, rest).cloned(),
            Entry::Action(_) => None,
        }
    }

    fn add_segments(&self, segments: &[String], value: Value) -> bool {
        let Some((key, rest)) = segments.split_first() else {
            // Adding at the root replaces the whole document.
            return match &value {
                Value::Object(map) => self.restore_object(map).is_ok(),
                _ => false,
            };
        };
        if is_reserved(key) {
            return false;
        }
        if rest.is_empty() {
            return self.assign(key.clone(), Slot::Value(value)).is_ok();
        }
        match self.lookup(key) {
            Some(Entry::Store(child)) => child.add_segments(rest, value),
            Some(Entry::Observable(cell)) => {
                let Some(mut doc) = cell.latest() else {
                    return false;
                };
                if !add_at(&mut doc, rest, value) {
                    return false;
                }
                cell.set(doc);
                true
            }
            Some(Entry::Unobserved(mut doc)) => {
                if !add_at(&mut doc, rest, value) {
                    return false;
                }
                self.replace_unobserved(key.clone(), doc);
                true
            }
            _ => false,
        }
    }

    fn remove_segments(&self, segments: &[String]) -> Option<Value> {
        let (key, rest) = segments.split_first()?;
        if is_reserved(key) {
            return None;
        }
        if rest.is_empty() {
            let removed = self.read_segments(segments)?;
            self.delete(key).ok()?;
            return Some(removed);
        }
        match self.lookup(key)? {
            Entry::Store(child) => child.remove_segments(rest),
            Entry::Observable(cell) => {
                let mut doc = cell.latest()?;
                let removed = remove_at(&mut doc, rest)?;
                cell.set(doc);
                Some(removed)
            }
            Entry::Unobserved(mut doc) => {
                let removed = remove_at(&mut doc, rest)?;
                self.replace_unobserved(key.clone(), doc);
                Some(removed)
            }
            _ => None,
        }
    }
}

impl PatchTarget for Store {
    fn read(&self, path: &Path) -> Option<Value> {
        self.read_segments(path.segments())
    }

    fn add(&mut self, path: &Path, value: Value) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.add_segments(path.segments(), value)
    }

    fn remove(&mut self, path: &Path) -> Option<Value> {
        if self.is_disposed() {
            return None;
        }
        self.remove_segments(path.segments())
    }
}
