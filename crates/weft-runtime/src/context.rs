//! Thread contexts and thread ids
//!
//! One `ThreadContext` per slot per core. The context owns a fixed-size
//! stack whose bottom word is an immutable canary, a saved stack pointer,
//! and the single 64-bit wakeup word that encodes the whole run state:
//!
//! - `UNOCCUPIED` (u64::MAX): slot free or thread exited
//! - `BLOCKED` (u64::MAX - 1): running, or waiting for a signal
//! - `0`: runnable now (fresh creations and yields)
//! - anything else: runnable once the cycle counter reaches that value
//!
//! Both sentinels compare larger than any realistic cycle count, so the
//! dispatcher's single `now >= wakeup` comparison skips them for free.

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use weft_core::constants::{CORE_ID_NONE, STACK_CANARY, UNOCCUPIED};
use weft_core::invocation::InvocationSlot;
use weft_core::kerror;
use weft_core::spinlock::SpinLock;

use crate::arch;

/// Execution context of one uthread slot.
#[repr(C, align(64))]
pub struct ThreadContext {
    /// Saved stack pointer; touched only by the owning core's dispatcher.
    sp: UnsafeCell<*mut u8>,

    /// Bottom of the owned stack region. The first u64 is the canary.
    stack_bottom: *mut u8,
    stack_size: usize,

    /// Run state word, see module docs.
    pub wakeup_time_in_cycles: AtomicU64,

    /// Bumped on each slot reuse; stale `ThreadId`s compare unequal.
    pub generation: AtomicU32,

    /// Owning core, `CORE_ID_NONE` while unattached.
    pub core_id: AtomicU8,

    /// Slot index within the owning core.
    pub id_in_core: u8,

    /// Joiners parked until this thread's exit path notifies them.
    pub join_waiters: SpinLock<Vec<ThreadId>>,

    /// In-place erased entry closure.
    pub invocation: InvocationSlot,
}

// Safety: cross-thread access goes through the atomics and the join
// lock; `sp` and the invocation storage are serialized by the slot
// lifecycle (dispatcher ownership, reservation protocol).
unsafe impl Send for ThreadContext {}
unsafe impl Sync for ThreadContext {}

impl ThreadContext {
    pub(crate) fn new(stack_bottom: *mut u8, stack_size: usize, id_in_core: u8) -> ThreadContext {
        unsafe {
            *(stack_bottom as *mut u64) = STACK_CANARY;
        }
        ThreadContext {
            sp: UnsafeCell::new(core::ptr::null_mut()),
            stack_bottom,
            stack_size,
            wakeup_time_in_cycles: AtomicU64::new(UNOCCUPIED),
            generation: AtomicU32::new(0),
            core_id: AtomicU8::new(CORE_ID_NONE),
            id_in_core,
            join_waiters: SpinLock::new(Vec::new()),
            invocation: InvocationSlot::new(),
        }
    }

    /// Seed the stack so the first restore enters `entry` with a
    /// zero-filled register area. Also rewrites the canary.
    ///
    /// Only valid while no dispatcher can be parked on this stack: at
    /// core allocation, and when a drained core is reactivated.
    pub(crate) fn seed(&self, entry: usize) {
        unsafe {
            *(self.stack_bottom as *mut u64) = STACK_CANARY;
            let top = self.stack_bottom.add(self.stack_size);
            *self.sp.get() = arch::seed_stack(top, entry);
        }
    }

    /// Location of the saved stack pointer, for the arch swap.
    #[inline]
    pub(crate) fn sp_cell(&self) -> *mut *mut u8 {
        self.sp.get()
    }

    /// Abort on a smashed canary. Called at every dispatch entry.
    #[inline]
    pub fn check_canary(&self) {
        let word = unsafe { *(self.stack_bottom as *const u64) };
        if word != STACK_CANARY {
            kerror!(
                "stack canary smashed on core {} slot {} ({:#018x})",
                self.core_id.load(Ordering::Relaxed),
                self.id_in_core,
                word
            );
            std::process::abort();
        }
    }
}

/// Handle to a created uthread: the context plus the generation observed
/// at creation. Once the slot is reused the generations diverge and
/// `signal`/`join` on the stale id become no-ops.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ThreadId {
    context: *const ThreadContext,
    generation: u32,
}

// Safety: the pointer is only dereferenced against runtime-owned,
// registry-lifetime contexts.
unsafe impl Send for ThreadId {}
unsafe impl Sync for ThreadId {}

impl ThreadId {
    /// Sentinel returned off-runtime.
    pub const NONE: ThreadId = ThreadId {
        context: core::ptr::null(),
        generation: 0,
    };

    pub(crate) fn new(context: &ThreadContext, generation: u32) -> ThreadId {
        ThreadId {
            context,
            generation,
        }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.context.is_null()
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        !self.context.is_null()
    }

    #[inline]
    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }

    /// The underlying context, while the runtime is alive.
    #[inline]
    pub(crate) fn context(&self) -> Option<&ThreadContext> {
        unsafe { self.context.as_ref() }
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        ThreadId::NONE
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "ThreadId(none)");
        }
        let ctx = unsafe { &*self.context };
        write!(
            f,
            "ThreadId(core {} slot {} gen {})",
            ctx.core_id.load(Ordering::Relaxed),
            ctx.id_in_core,
            self.generation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_context() -> (Vec<u8>, ThreadContext) {
        let mut stack = vec![0u8; 16 * 1024];
        let bottom = stack.as_mut_ptr();
        let ctx = ThreadContext::new(bottom, 16 * 1024, 3);
        (stack, ctx)
    }

    #[test]
    fn test_new_context_state() {
        let (_stack, ctx) = scratch_context();
        assert_eq!(ctx.wakeup_time_in_cycles.load(Ordering::Relaxed), UNOCCUPIED);
        assert_eq!(ctx.core_id.load(Ordering::Relaxed), CORE_ID_NONE);
        assert_eq!(ctx.id_in_core, 3);
        assert_eq!(unsafe { *(ctx.stack_bottom as *const u64) }, STACK_CANARY);
        ctx.check_canary();
    }

    #[test]
    fn test_seed_points_into_stack() {
        let (_stack, ctx) = scratch_context();
        ctx.seed(0x1000);
        let sp = unsafe { *ctx.sp_cell() } as usize;
        let bottom = ctx.stack_bottom as usize;
        assert!(sp > bottom && sp < bottom + 16 * 1024);
        assert_eq!(sp % 16, 0);
    }

    #[test]
    fn test_stale_id_compares_unequal() {
        let (_stack, ctx) = scratch_context();
        let id = ThreadId::new(&ctx, ctx.generation.load(Ordering::Relaxed));
        ctx.generation.fetch_add(1, Ordering::Relaxed);
        assert_ne!(id.generation(), ctx.generation.load(Ordering::Relaxed));
        assert!(id.is_some());
        assert!(ThreadId::NONE.is_none());
    }
}
