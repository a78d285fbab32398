use std::sync::Arc;

use crate::tcp::counters::Counters;

/// Index into a [`SlotPool`]. Slot ids are indices, not pointers, so they
/// stay `Copy` and outlive any particular borrow of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

/// Fixed-size buffer pool backing the write path's partial-write buffering.
///
/// A slot holds the unwritten suffix of a DATA frame while a socket is
/// transiently unwritable. Slots are fixed-size slabs in one contiguous
/// arena with a free-list of indices, never individually allocated.
pub struct SlotPool {
    slab: Vec<u8>,
    slot_size: usize,
    free: Vec<SlotId>,
    counters: Arc<Counters>,
}

impl SlotPool {
    #[must_use]
    pub fn new(slot_size: usize, slot_count: usize, counters: Arc<Counters>) -> Self {
        let free = (0..slot_count).map(SlotId).collect();
        Self { slab: vec![0; slot_size * slot_count], slot_size, free, counters }
    }

    /// Acquire a free slot, copying `data` into the front of it.
    ///
    /// Returns `None` (and bumps the overflow counter) if the pool is
    /// exhausted or `data` doesn't fit in one slot.
    pub fn acquire(&mut self, data: &[u8]) -> Option<SlotId> {
        if data.len() > self.slot_size {
            self.counters.overflow();
            return None;
        }
        let Some(id) = self.free.pop() else {
            self.counters.overflow();
            return None;
        };
        self.slice_mut(id)[..data.len()].copy_from_slice(data);
        Some(id)
    }

    #[must_use]
    pub fn slice(&self, id: SlotId) -> &[u8] {
        let start = id.0 * self.slot_size;
        &self.slab[start..start + self.slot_size]
    }

    pub fn slice_mut(&mut self, id: SlotId) -> &mut [u8] {
        let start = id.0 * self.slot_size;
        &mut self.slab[start..start + self.slot_size]
    }

    pub fn release(&mut self, id: SlotId) {
        self.free.push(id);
    }

    /// Bumps the overflow counter for a failure that happens outside
    /// `acquire` (e.g. a pending slot that can't grow to fit more appended
    /// data).
    pub fn record_overflow(&self) {
        self.counters.overflow();
    }

    #[must_use]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_round_trips() {
        let mut pool = SlotPool::new(16, 2, Counters::new());
        let id = pool.acquire(b"hello").expect("slot available");
        assert_eq!(&pool.slice(id)[..5], b"hello");
        pool.release(id);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn exhaustion_increments_overflow_counter() {
        let counters = Counters::new();
        let mut pool = SlotPool::new(16, 1, counters.clone());
        let first = pool.acquire(b"one").expect("first slot available");
        assert!(pool.acquire(b"two").is_none());
        assert_eq!(counters.overflows(), 1);
        pool.release(first);
        assert!(pool.acquire(b"two").is_some());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let counters = Counters::new();
        let mut pool = SlotPool::new(4, 1, counters.clone());
        assert!(pool.acquire(b"too long").is_none());
        assert_eq!(counters.overflows(), 1);
    }
}
