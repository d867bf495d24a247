//! Outstanding segments awaiting acknowledgement, for one flow.
//!
//! Lookups go through a hash index; a queue remembers insertion order so
//! that the oldest entry can be dropped when the map is full. Entries
//! removed by an ack stay in the queue as tombstones until they reach the
//! front or the queue is compacted.

use fxhash::FxHashMap;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    sent_at: u64,
    generation: u64,
}

#[derive(Debug)]
pub(crate) struct PendingRequests {
    capacity: usize,
    index: FxHashMap<u32, Pending>,
    order: VecDeque<(u32, u64)>,
    next_generation: u64,
}

impl PendingRequests {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            index: FxHashMap::default(),
            order: VecDeque::new(),
            next_generation: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn contains(&self, seq: u32) -> bool {
        self.index.contains_key(&seq)
    }

    /// Remember that `seq` was sent at `sent_at`. Returns the number of
    /// older entries evicted to make room (zero or one).
    pub(crate) fn insert(&mut self, seq: u32, sent_at: u64) -> usize {
        if self.index.contains_key(&seq) {
            return 0;
        }
        let mut evicted = 0;
        while self.index.len() >= self.capacity {
            if self.evict_oldest() {
                evicted += 1;
            } else {
                break;
            }
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.index.insert(seq, Pending { sent_at, generation });
        self.order.push_back((seq, generation));
        if self.order.len() > self.capacity * 2 {
            self.compact();
        }
        evicted
    }

    /// Remove and return the send time for `seq`, if it is outstanding.
    pub(crate) fn take(&mut self, seq: u32) -> Option<u64> {
        self.index.remove(&seq).map(|p| p.sent_at)
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((seq, generation)) = self.order.pop_front() {
            let live = self
                .index
                .get(&seq)
                .is_some_and(|p| p.generation == generation);
            if live {
                self.index.remove(&seq);
                return true;
            }
        }
        false
    }

    fn compact(&mut self) {
        let index = &self.index;
        self.order
            .retain(|(seq, generation)| index.get(seq).is_some_and(|p| p.generation == *generation));
    }
}

#[cfg(test)]
mod tests {
    use super::PendingRequests;

    #[test]
    fn take_once() {
        let mut pending = PendingRequests::new(4);
        pending.insert(1000, 5);
        assert_eq!(pending.take(1000), Some(5));
        assert_eq!(pending.take(1000), None);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn reinsert_keeps_original_send_time() {
        let mut pending = PendingRequests::new(4);
        pending.insert(1000, 5);
        pending.insert(1000, 9);
        assert_eq!(pending.take(1000), Some(5));
    }

    #[test]
    fn fifo_eviction_at_capacity() {
        let mut pending = PendingRequests::new(3);
        assert_eq!(pending.insert(1, 1), 0);
        assert_eq!(pending.insert(2, 2), 0);
        assert_eq!(pending.insert(3, 3), 0);
        assert_eq!(pending.insert(4, 4), 1);
        assert_eq!(pending.len(), 3);
        assert!(!pending.contains(1));
        assert!(pending.contains(2));
        assert!(pending.contains(4));
    }

    #[test]
    fn eviction_skips_tombstones() {
        let mut pending = PendingRequests::new(2);
        pending.insert(1, 1);
        pending.insert(2, 2);
        assert_eq!(pending.take(1), Some(1));
        pending.insert(3, 3);
        // 1 was already acked, so the map had room and nothing was evicted
        assert!(pending.contains(2));
        assert_eq!(pending.insert(4, 4), 1);
        assert!(!pending.contains(2));
        assert!(pending.contains(3));
        assert!(pending.contains(4));
    }

    #[test]
    fn reinserted_seq_is_not_evicted_by_its_tombstone() {
        let mut pending = PendingRequests::new(2);
        pending.insert(1, 1);
        pending.take(1);
        pending.insert(2, 2);
        pending.insert(1, 3);
        // Queue is [1(old), 2, 1(new)]; the old entry for 1 is a tombstone.
        pending.insert(5, 5);
        assert!(!pending.contains(2));
        assert_eq!(pending.take(1), Some(3));
    }

    #[test]
    fn order_queue_stays_bounded() {
        let mut pending = PendingRequests::new(8);
        for seq in 0..10_000u32 {
            pending.insert(seq, u64::from(seq));
            pending.take(seq);
        }
        assert!(pending.order.len() <= 16);
        assert_eq!(pending.len(), 0);
    }
}
