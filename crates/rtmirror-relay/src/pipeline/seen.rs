//! Bounded set of record ids already handed to the relay pipeline.

use rtmirror_core::RecordId;
use std::collections::{HashSet, VecDeque};

/// FIFO-bounded membership index.
///
/// Once full, remembering a new id forgets the oldest one. A capacity of
/// zero disables the index.
#[derive(Debug)]
pub struct SeenIndex {
    order: VecDeque<RecordId>,
    ids: HashSet<RecordId>,
    capacity: usize,
}

impl SeenIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.ids.contains(&id)
    }

    /// Remember `id`. Returns false if it was already present.
    pub fn insert(&mut self, id: RecordId) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity
            && let Some(evicted) = self.order.pop_front()
        {
            self.ids.remove(&evicted);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
