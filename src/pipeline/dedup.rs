//! Dedup registry: the concurrency-safe set shared by every batch of one distinct-returning operation.

use dashmap::DashSet;
use std::hash::Hash;

/// Set of elements already emitted by a distinct step. Created when the chain is instantiated for
/// one terminal call and dropped with it, so nothing leaks into the next call.
#[derive(Debug)]
pub struct DedupRegistry<T: Eq + Hash> {
    seen: DashSet<T>,
}

impl<T: Eq + Hash> Default for DedupRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash> DedupRegistry<T> {
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// Atomic insert-if-absent. True only for the first caller to offer an equal value, across all threads.
    pub fn insert_if_absent(&self, value: T) -> bool {
        self.seen.insert(value)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
