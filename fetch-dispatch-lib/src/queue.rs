//! Pending work cursor.
//!
//! Items are allocated once up front; claiming is a single atomic increment
//! of a shared index, so every item is handed out at most once no matter how
//! many workers race for it.

use crate::types::WorkItem;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared cursor over the pending work items of one dispatch.
#[derive(Debug)]
pub struct WorkQueue {
    items: Vec<WorkItem>,
    next: AtomicUsize,
}

impl WorkQueue {
    /// Enqueue every resource, keeping its original index.
    pub fn new<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = resources
            .into_iter()
            .enumerate()
            .map(|(index, resource)| WorkItem {
                index,
                resource: resource.into(),
            })
            .collect();

        Self {
            items,
            next: AtomicUsize::new(0),
        }
    }

    /// Claim the next unclaimed item, or `None` once the queue is drained.
    ///
    /// A `None` is final: the cursor only moves forward.
    pub fn claim(&self) -> Option<&WorkItem> {
        let position = self.next.fetch_add(1, Ordering::Relaxed);
        self.items.get(position)
    }

    /// Total number of items, claimed or not.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items not yet claimed.
    pub fn remaining(&self) -> usize {
        self.items
            .len()
            .saturating_sub(self.next.load(Ordering::Relaxed))
    }
}
