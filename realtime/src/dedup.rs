//! Bounded membership set guarding against re-delivery of a repeated upstream
//! notification.
//!
//! When the set is full the whole history is dropped at once before the next
//! identifier is recorded, so an identifier seen just before a reset is
//! accepted again afterwards.

use log::*;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// Opaque token identifying one raw upstream notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Strings are used verbatim and numbers by their decimal form; any other
    /// JSON value is not an identifier.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct DedupCache {
    capacity: usize,
    seen: Mutex<HashSet<EventId>>,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: Mutex::new(HashSet::with_capacity(capacity)),
        }
    }

    /// Test membership and record the identifier in one step.
    ///
    /// Returns `true` when `id` was already present (a duplicate). Otherwise
    /// the cache is reset if it is at capacity, `id` is inserted and `false`
    /// is returned.
    pub fn seen(&self, id: &EventId) -> bool {
        let mut seen = self.lock();
        if seen.contains(id) {
            return true;
        }
        Self::clear_if_full(&mut seen, self.capacity);
        seen.insert(id.clone());
        false
    }

    /// Clear the whole cache if it holds `capacity` identifiers. Returns
    /// whether a reset happened.
    pub fn reset_if_full(&self) -> bool {
        Self::clear_if_full(&mut self.lock(), self.capacity)
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear_if_full(seen: &mut HashSet<EventId>, capacity: usize) -> bool {
        if seen.len() < capacity {
            return false;
        }
        debug!("Dedup cache reached {capacity} entries, resetting");
        seen.clear();
        true
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<EventId>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
