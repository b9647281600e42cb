//! Re-serializing out-of-order results into emission order

use super::error::AggregateError;
use std::collections::BTreeMap;

/// Holds items that finished early until every earlier sequence number has
/// been released.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T> ReorderBuffer<T> {
    /// A buffer whose first expected sequence number is `start`
    pub fn new(start: u64) -> Self {
        Self {
            next: start,
            pending: BTreeMap::new(),
        }
    }

    /// Accept one item and return every item now releasable, in order.
    pub fn push(&mut self, sequence: u64, item: T) -> Result<Vec<(u64, T)>, AggregateError> {
        if sequence < self.next || self.pending.contains_key(&sequence) {
            return Err(AggregateError::DuplicateSequence(sequence));
        }
        self.pending.insert(sequence, item);

        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push((self.next, item));
            self.next += 1;
        }
        Ok(ready)
    }

    /// Number of items waiting on an earlier sequence number
    pub fn waiting(&self) -> usize {
        self.pending.len()
    }

    /// Release whatever is still held, in sequence order, skipping gaps.
    pub fn finish(self) -> Vec<(u64, T)> {
        self.pending.into_iter().collect()
    }
}
