//! Per-core runtime state
//!
//! One `CoreState` per registry index: the packed slot map, the 56
//! thread contexts with their stack block, the public priority mask, the
//! dispatcher's round-robin cursor, and the saved kernel-entry stack
//! pointer the tear-down path restores.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use weft_core::constants::{MAX_THREADS_PER_CORE, UNOCCUPIED};
use weft_core::slot_map::SlotMap;

use crate::context::ThreadContext;
use crate::dispatch;
use crate::memory::StackRegion;
use crate::stats::CoreStats;

pub struct CoreState {
    /// Registry index of this core.
    pub index: u8,

    /// Packed occupancy bitmap + count.
    pub slot_map: SlotMap,

    /// Boost bits OR'd in by `signal`; drained into the dispatcher's
    /// thread-local private mask.
    pub public_priority_mask: AtomicU64,

    /// Round-robin cursor of the dispatcher's slow path.
    pub next_candidate_index: AtomicUsize,

    /// Ramp-down in progress: placement refuses the core, the slot map
    /// only drains, and the dispatcher exits once it is empty.
    pub draining: AtomicBool,

    /// Stack pointer of the kernel thread's own stack, saved when it
    /// swapped onto its first context. The shutdown/drain path restores
    /// it so `thread_main` returns.
    pub kernel_entry_sp: UnsafeCell<*mut u8>,

    pub stats: CoreStats,

    /// Cycle stamp of the dispatcher's last accounting point.
    pub last_stamp: AtomicU64,

    contexts: Box<[ThreadContext]>,

    /// Owned stack block backing the contexts; dropped (unmapped) with
    /// the core.
    _stack_region: StackRegion,
}

// Safety: shared fields are atomics; kernel_entry_sp and the contexts'
// interior cells are serialized by the one-dispatcher-per-core and slot
// lifecycle protocols.
unsafe impl Send for CoreState {}
unsafe impl Sync for CoreState {}

impl CoreState {
    /// Map the stack block, build and seed all 56 contexts.
    pub fn allocate(index: u8, stack_size: usize) -> Box<CoreState> {
        let region = StackRegion::map(stack_size);
        let contexts: Vec<ThreadContext> = (0..MAX_THREADS_PER_CORE)
            .map(|k| ThreadContext::new(region.stack_bottom(k), stack_size, k as u8))
            .collect();

        let core = Box::new(CoreState {
            index,
            slot_map: SlotMap::new(),
            public_priority_mask: AtomicU64::new(0),
            next_candidate_index: AtomicUsize::new(0),
            draining: AtomicBool::new(false),
            kernel_entry_sp: UnsafeCell::new(core::ptr::null_mut()),
            stats: CoreStats::new(),
            last_stamp: AtomicU64::new(0),
            contexts: contexts.into_boxed_slice(),
            _stack_region: region,
        });
        core.seed_contexts();
        core
    }

    /// Reset a quiesced core for reuse after a drain: fresh seed frames,
    /// all slots unoccupied, no leftover boosts. Generations are
    /// preserved so stale ids from the previous epoch stay stale.
    ///
    /// Caller must hold the core-change mutex and the core must have no
    /// kernel thread.
    pub fn reseed(&self) {
        debug_assert!(self.slot_map.is_empty());
        self.seed_contexts();
        self.public_priority_mask.store(0, Ordering::Relaxed);
        self.next_candidate_index.store(0, Ordering::Relaxed);
        self.draining.store(false, Ordering::Relaxed);
    }

    fn seed_contexts(&self) {
        let entry = dispatch::scheduler_main_loop as usize;
        for ctx in self.contexts.iter() {
            ctx.seed(entry);
            ctx.wakeup_time_in_cycles
                .store(UNOCCUPIED, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn context(&self, slot: usize) -> &ThreadContext {
        &self.contexts[slot]
    }

    #[inline]
    pub fn contexts(&self) -> &[ThreadContext] {
        &self.contexts
    }

    /// Book the cycles since the last accounting point.
    pub fn account(&self, now: u64, idle: bool) {
        let prev = self.last_stamp.swap(now, Ordering::Relaxed);
        let elapsed = now.saturating_sub(prev);
        if elapsed == 0 {
            return;
        }
        let occupied = self.slot_map.num_occupied() as u64;
        self.stats.total_cycles.fetch_add(elapsed, Ordering::Relaxed);
        if idle {
            self.stats.idle_cycles.fetch_add(elapsed, Ordering::Relaxed);
        }
        self.stats
            .weighted_loaded_cycles
            .fetch_add(elapsed * occupied, Ordering::Relaxed);
    }
}
