//! CLOCK (second-chance) replacement policy.
//!
//! Approximates LRU with one reference bit per frame instead of access
//! timestamps. Frames sit on a circular dial; the hand sweeps past them and
//! evicts the first evictable frame whose reference bit is clear, clearing
//! set bits as it goes.
//!
//! ```text
//!            hand
//!             ↓
//!   ┌───┬───┬───┬───┬───┬───┐
//!   │ 0 │ 1 │ 2 │ 3 │ 4 │ 5 │   in_policy: frame may be evicted
//!   └───┴───┴───┴───┴───┴───┘   referenced: touched since last sweep
//!     scan order: 3 → 4 → 5 → 0 → 1 → 2 → (second sweep) 3 → ...
//! ```

use crate::common::FrameId;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    /// Resident with pin count 0.
    in_policy: bool,
    /// Reference bit.
    referenced: bool,
}

/// Clock eviction policy over a fixed number of frames.
///
/// The replacer knows nothing about pages or disk. The buffer pool reports
/// pin-count transitions through [`record_pinned`](Self::record_pinned) and
/// [`record_unpinned`](Self::record_unpinned), and asks for a
/// [`victim`](Self::victim) when it needs a frame.
///
/// # Example
/// ```
/// use clockpool::buffer::replacer::ClockReplacer;
/// use clockpool::FrameId;
///
/// let mut replacer = ClockReplacer::new(3);
/// replacer.record_unpinned(FrameId::new(0));
/// replacer.record_unpinned(FrameId::new(2));
/// assert_eq!(replacer.size(), 2);
///
/// // Both frames are referenced; the first sweep clears their bits and the
/// // second sweep picks the first clear one after the hand.
/// assert_eq!(replacer.victim(), Some(FrameId::new(2)));
/// assert_eq!(replacer.size(), 1);
/// ```
#[derive(Debug)]
pub struct ClockReplacer {
    slots: Vec<Slot>,
    /// Last position inspected. The next scan starts one past it.
    hand: usize,
    /// Number of slots with `in_policy` set.
    evictable: usize,
}

impl ClockReplacer {
    /// Create a replacer tracking frames `0..capacity`, none evictable.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::default(); capacity],
            hand: 0,
            evictable: 0,
        }
    }

    /// The frame was released (pin count dropped to 0).
    ///
    /// Makes the frame a candidate and sets its reference bit, so it survives
    /// the next sweep. Calling it again before a pin has no further effect.
    ///
    /// # Panics
    /// Panics if `frame_id` is out of range.
    pub fn record_unpinned(&mut self, frame_id: FrameId) {
        let slot = &mut self.slots[frame_id.index()];
        if !slot.in_policy {
            slot.in_policy = true;
            self.evictable += 1;
        }
        slot.referenced = true;
    }

    /// The frame is in use again (pin count left 0).
    ///
    /// Withdraws candidacy; the reference bit is left alone.
    ///
    /// # Panics
    /// Panics if `frame_id` is out of range.
    pub fn record_pinned(&mut self, frame_id: FrameId) {
        let slot = &mut self.slots[frame_id.index()];
        if slot.in_policy {
            slot.in_policy = false;
            self.evictable -= 1;
        }
    }

    /// Forget the frame entirely (its page was deleted).
    ///
    /// # Panics
    /// Panics if `frame_id` is out of range.
    pub fn remove(&mut self, frame_id: FrameId) {
        self.record_pinned(frame_id);
        self.slots[frame_id.index()].referenced = false;
    }

    /// Select and withdraw a victim frame.
    ///
    /// Scans at most two full revolutions starting just after the hand. The
    /// first revolution clears the reference bit of every candidate it passes,
    /// so if any frame is evictable the second revolution is guaranteed to
    /// find one. The hand rests on the victim.
    ///
    /// Returns `None` only when no frame is evictable.
    pub fn victim(&mut self) -> Option<FrameId> {
        if self.evictable == 0 {
            return None;
        }

        let capacity = self.slots.len();
        for _ in 0..2 * capacity {
            self.hand = (self.hand + 1) % capacity;
            let slot = &mut self.slots[self.hand];
            if !slot.in_policy {
                continue;
            }
            if slot.referenced {
                slot.referenced = false;
                continue;
            }

            slot.in_policy = false;
            self.evictable -= 1;
            return Some(FrameId::new(self.hand));
        }

        // Unreachable while `evictable` is kept in step with the slots.
        None
    }

    /// Number of evictable frames.
    #[inline]
    pub fn size(&self) -> usize {
        self.evictable
    }

    /// Number of frames tracked.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether the frame is currently a candidate.
    pub fn is_evictable(&self, frame_id: FrameId) -> bool {
        self.slots
            .get(frame_id.index())
            .is_some_and(|slot| slot.in_policy)
    }
}
