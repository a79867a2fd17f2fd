// =============================================================================
// RollingWindow — fixed-capacity FIFO over completed candle fields
// =============================================================================
//
// A bounded, oldest-first sequence: appending at capacity evicts the oldest
// element. This is a plain data structure; thread safety lives one level up
// in the aggregator, which keeps the five per-symbol windows behind a single
// lock so a committed candle's fields are always appended and read as a unit.
// =============================================================================

use std::collections::VecDeque;

/// Fixed-capacity rolling window with strict FIFO eviction.
#[derive(Debug)]
pub struct RollingWindow<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> RollingWindow<T> {
    /// Create an empty window that retains at most `capacity` elements.
    ///
    /// A zero capacity is coerced to 1 so that `append` always retains the
    /// newest value.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `value` as the newest element, evicting the oldest first when
    /// the window is full. O(1) amortized.
    pub fn append(&mut self, value: T) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Copy the current contents, oldest-first. Later appends never mutate a
    /// previously returned snapshot.
    pub fn snapshot(&self) -> Vec<T> {
        self.values.iter().copied().collect()
    }

    /// Number of elements currently held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Configured maximum length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_below_capacity_keeps_everything() {
        let mut w = RollingWindow::new(5);
        w.append(1.0);
        w.append(2.0);
        assert_eq!(w.len(), 2);
        assert_eq!(w.snapshot(), vec![1.0, 2.0]);
    }

    #[test]
    fn append_at_capacity_evicts_oldest() {
        let mut w = RollingWindow::new(3);
        for i in 0..5i64 {
            w.append(i);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.snapshot(), vec![2, 3, 4]);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut w = RollingWindow::new(2);
        for i in 0..100i64 {
            w.append(i);
            assert!(w.len() <= 2);
        }
        assert_eq!(w.snapshot(), vec![98, 99]);
    }

    #[test]
    fn snapshot_is_an_independent_copy() {
        let mut w = RollingWindow::new(4);
        w.append(10.0);
        let snap = w.snapshot();
        w.append(20.0);
        w.append(30.0);
        assert_eq!(snap, vec![10.0]);
        assert_eq!(w.snapshot(), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn zero_capacity_is_coerced_to_one() {
        let mut w = RollingWindow::new(0);
        w.append(1);
        w.append(2);
        assert_eq!(w.snapshot(), vec![2]);
        assert_eq!(w.capacity(), 1);
    }
}
