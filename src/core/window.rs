//! Resident-set tracking for the frame cache.
//!
//! Structure: `IndexSet<usize>` of frame indices that are resident or have a
//! prefetch task in flight, in the order they were claimed.
//!
//! - **Bounded mode** (`capacity < frame_count`): the window never holds more
//!   than `capacity` indices; a full window is the backpressure signal for the
//!   prefetch loop. Consumed frames are released.
//! - **Whole-timeline mode** (`capacity >= frame_count`): nothing is ever
//!   evicted, the window can hold every index.

use indexmap::IndexSet;
use log::debug;

#[derive(Debug, Clone)]
pub struct ResidentWindow {
    tracked: IndexSet<usize>,
    capacity: usize,
    frame_count: usize,
}

impl ResidentWindow {
    pub fn new(capacity: usize, frame_count: usize) -> Self {
        let capacity = capacity.max(1);
        debug!(
            "ResidentWindow created: capacity={}, frames={}, bounded={}",
            capacity,
            frame_count,
            capacity < frame_count
        );
        Self {
            tracked: IndexSet::with_capacity(capacity.min(frame_count)),
            capacity,
            frame_count,
        }
    }

    /// True when the window is smaller than the timeline and evicts.
    pub fn is_bounded(&self) -> bool {
        self.capacity < self.frame_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// No room for another index (never true in whole-timeline mode)
    pub fn is_full(&self) -> bool {
        self.is_bounded() && self.tracked.len() >= self.capacity
    }

    pub fn contains(&self, index: usize) -> bool {
        self.tracked.contains(&index)
    }

    /// Claim a slot for `index`. Returns false if already tracked.
    pub fn track(&mut self, index: usize) -> bool {
        debug_assert!(
            !self.is_full() || self.tracked.contains(&index),
            "track() on a full window"
        );
        self.tracked.insert(index)
    }

    /// Release the slot of `index`. Returns false if it was not tracked.
    pub fn release(&mut self, index: usize) -> bool {
        self.tracked.shift_remove(&index)
    }

    /// Keep only the indices for which `keep` returns true; returns the
    /// released indices in claim order.
    pub fn retain(&mut self, mut keep: impl FnMut(usize) -> bool) -> Vec<usize> {
        let mut released = Vec::new();
        self.tracked.retain(|&index| {
            let k = keep(index);
            if !k {
                released.push(index);
            }
            k
        });
        released
    }

    /// Window of indices worth keeping when playback restarts at `from`:
    /// `[from, from + capacity)` in bounded mode, everything otherwise.
    pub fn keeps(&self, from: usize, index: usize) -> bool {
        !self.is_bounded() || (index >= from && index < from.saturating_add(self.capacity))
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.tracked.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_mode() {
        let mut w = ResidentWindow::new(3, 10);
        assert!(w.is_bounded());
        assert!(w.track(0));
        assert!(w.track(1));
        assert!(!w.track(1));
        assert!(!w.is_full());
        assert!(w.track(2));
        assert!(w.is_full());
        assert_eq!(w.len(), 3);

        assert!(w.release(0));
        assert!(!w.release(0));
        assert!(!w.is_full());
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_whole_timeline_mode_never_full() {
        let mut w = ResidentWindow::new(10, 10);
        assert!(!w.is_bounded());
        for i in 0..10 {
            w.track(i);
        }
        assert!(!w.is_full());
        assert!(w.keeps(5, 0));

        let w = ResidentWindow::new(200, 10);
        assert!(!w.is_bounded());
    }

    #[test]
    fn test_retain_reports_released() {
        let mut w = ResidentWindow::new(5, 20);
        for i in [4, 5, 6, 7, 8] {
            w.track(i);
        }
        let released = w.retain(in_middle);
        assert_eq!(released, vec![4, 8]);
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![5, 6, 7]);

        fn in_middle(i: usize) -> bool {
            (5..8).contains(&i)
        }
    }

    #[test]
    fn test_keeps_window() {
        let w = ResidentWindow::new(3, 10);
        assert!(!w.keeps(4, 3));
        assert!(w.keeps(4, 4));
        assert!(w.keeps(4, 6));
        assert!(!w.keeps(4, 7));
    }
}
