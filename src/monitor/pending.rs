//! Pending work tracking
//!
//! Change events whose handler outcome has not been inspected yet, ordered
//! by event id. The maintenance loop takes the smallest id first, optionally
//! skipping entries whose task is not ready.

use crate::events::ChangeEvent;
use std::collections::BTreeMap;

/// A tracked event and the handle of its handler task
#[derive(Debug)]
pub struct PendingEntry<H> {
    /// The event being handled (carries its retry count)
    pub event: ChangeEvent,
    /// Handle of the in-flight task
    pub task: H,
}

/// Ordered map from event id to its in-flight task
///
/// At most one entry per id is tracked.
#[derive(Debug)]
pub struct PendingWork<H> {
    entries: BTreeMap<String, PendingEntry<H>>,
}

impl<H> Default for PendingWork<H> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<H> PendingWork<H> {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an event, returning the entry it replaced (same id), if any
    pub fn insert(&mut self, event: ChangeEvent, task: H) -> Option<PendingEntry<H>> {
        self.entries
            .insert(event.id.clone(), PendingEntry { event, task })
    }

    /// Remove and return the entry with the smallest id
    pub fn pop_first(&mut self) -> Option<PendingEntry<H>> {
        self.entries.pop_first().map(|(_, entry)| entry)
    }

    /// Remove and return the smallest-id entry whose task satisfies `ready`
    pub fn pop_first_where(&mut self, ready: impl Fn(&H) -> bool) -> Option<PendingEntry<H>> {
        let id = self
            .entries
            .iter()
            .find(|(_, entry)| ready(&entry.task))
            .map(|(id, _)| id.clone())?;
        self.entries.remove(&id)
    }

    /// Smallest tracked id
    pub fn first_id(&self) -> Option<&str> {
        self.entries.keys().next().map(String::as_str)
    }

    /// Whether an id is tracked
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Tracked ids in processing order
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of tracked events
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
