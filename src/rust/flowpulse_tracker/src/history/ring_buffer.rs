use std::collections::VecDeque;

/// Fixed-capacity buffer that drops its oldest entry when full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RingBuffer {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add an item, returning the one it displaced (if any).
    pub fn add(&mut self, item: T) -> Option<T> {
        let evicted = if self.data.len() >= self.capacity {
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(item);
        evicted
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.data.back()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.data.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;

    #[test]
    fn evicts_oldest() {
        let mut buffer = RingBuffer::new(3);
        for i in 0..3 {
            assert_eq!(buffer.add(i), None);
        }
        assert_eq!(buffer.add(3), Some(0));
        assert_eq!(buffer.to_vec(), vec![1, 2, 3]);
        assert_eq!(buffer.latest(), Some(&3));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut buffer = RingBuffer::new(0);
        buffer.add("a");
        buffer.add("b");
        assert_eq!(buffer.to_vec(), vec!["b"]);
        assert_eq!(buffer.capacity(), 1);
    }
}
