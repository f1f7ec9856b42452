//! Packed per-core slot occupancy word.
//!
//! A single 64-bit atomic holds both the 56-bit occupancy bitmap (bit k set
//! means slot k carries a live or in-creation thread) and, in the high 8
//! bits, the exact population count. Every mutation goes through a
//! compare-and-swap of the whole word, so the bitmap and the count can never
//! disagree: `popcount(occupied) == num_occupied` after each successful CAS.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::constants::MAX_THREADS_PER_CORE;

const OCCUPIED_MASK: u64 = (1u64 << MAX_THREADS_PER_CORE) - 1;
const COUNT_SHIFT: u32 = MAX_THREADS_PER_CORE as u32;

/// Occupancy bitmap + count for one core's 56 slots.
pub struct SlotMap {
    word: AtomicU64,
}

impl SlotMap {
    pub const fn new() -> Self {
        SlotMap {
            word: AtomicU64::new(0),
        }
    }

    /// Reserve the lowest clear slot.
    ///
    /// Returns the slot index on success, `None` when all 56 slots are
    /// taken. Contended CAS is retried unconditionally; this never blocks.
    pub fn reserve(&self) -> Option<u8> {
        loop {
            let word = self.word.load(Ordering::Relaxed);
            let occupied = word & OCCUPIED_MASK;
            let count = word >> COUNT_SHIFT;
            if count as usize >= MAX_THREADS_PER_CORE {
                return None;
            }

            // Lowest clear bit; the policy, not an invariant.
            let slot = (!occupied & OCCUPIED_MASK).trailing_zeros();
            let next = (occupied | (1u64 << slot)) | ((count + 1) << COUNT_SHIFT);
            debug_assert_eq!((next & OCCUPIED_MASK).count_ones() as u64, next >> COUNT_SHIFT);

            if self
                .word
                .compare_exchange_weak(word, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(slot as u8);
            }
        }
    }

    /// Clear slot `k` and decrement the count.
    pub fn release(&self, slot: u8) {
        debug_assert!((slot as usize) < MAX_THREADS_PER_CORE);
        loop {
            let word = self.word.load(Ordering::Relaxed);
            debug_assert!(word & (1u64 << slot) != 0, "releasing a clear slot");
            let next = (word & !(1u64 << slot)) - (1u64 << COUNT_SHIFT);
            debug_assert_eq!((next & OCCUPIED_MASK).count_ones() as u64, next >> COUNT_SHIFT);

            if self
                .word
                .compare_exchange_weak(word, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// One-shot snapshot of the occupancy bitmap.
    #[inline]
    pub fn occupied(&self) -> u64 {
        self.word.load(Ordering::Acquire) & OCCUPIED_MASK
    }

    /// Exact number of occupied slots.
    #[inline]
    pub fn num_occupied(&self) -> u8 {
        (self.word.load(Ordering::Acquire) >> COUNT_SHIFT) as u8
    }

    #[inline]
    pub fn is_occupied(&self, slot: u8) -> bool {
        self.occupied() & (1u64 << slot) != 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.num_occupied() as usize >= MAX_THREADS_PER_CORE
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.word.load(Ordering::Acquire) == 0
    }
}

impl Default for SlotMap {
    fn default() -> Self {
        SlotMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coherent(map: &SlotMap) -> bool {
        map.occupied().count_ones() as u8 == map.num_occupied()
    }

    #[test]
    fn test_reserve_lowest_clear_bit() {
        let map = SlotMap::new();
        assert_eq!(map.reserve(), Some(0));
        assert_eq!(map.reserve(), Some(1));
        assert_eq!(map.reserve(), Some(2));
        map.release(1);
        // The freed slot is the lowest clear bit again.
        assert_eq!(map.reserve(), Some(1));
        assert!(coherent(&map));
    }

    #[test]
    fn test_exhaustion_at_capacity() {
        let map = SlotMap::new();
        for expected in 0..MAX_THREADS_PER_CORE {
            assert_eq!(map.reserve(), Some(expected as u8));
        }
        assert!(map.is_full());
        assert_eq!(map.reserve(), None);
        assert!(coherent(&map));

        map.release(17);
        assert_eq!(map.reserve(), Some(17));
        assert_eq!(map.reserve(), None);
    }

    #[test]
    fn test_release_updates_both_halves() {
        let map = SlotMap::new();
        let a = map.reserve().unwrap();
        let b = map.reserve().unwrap();
        assert_eq!(map.num_occupied(), 2);

        map.release(a);
        assert_eq!(map.num_occupied(), 1);
        assert!(!map.is_occupied(a));
        assert!(map.is_occupied(b));
        assert!(coherent(&map));

        map.release(b);
        assert!(map.is_empty());
    }

    #[test]
    fn test_concurrent_reserve_release() {
        use std::sync::Arc;
        use std::thread;

        let map = Arc::new(SlotMap::new());
        let mut handles = vec![];
        for _ in 0..4 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    if let Some(slot) = map.reserve() {
                        map.release(slot);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(map.is_empty());
        assert!(coherent(&map));
    }

    #[test]
    fn test_concurrent_reservations_are_unique() {
        use std::sync::Arc;
        use std::thread;

        let map = Arc::new(SlotMap::new());
        let mut handles = vec![];
        for _ in 0..4 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                let mut mine = vec![];
                while let Some(slot) = map.reserve() {
                    mine.push(slot);
                }
                mine
            }));
        }
        let mut all: Vec<u8> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), MAX_THREADS_PER_CORE);
        assert_eq!(map.num_occupied() as usize, MAX_THREADS_PER_CORE);
    }
}
