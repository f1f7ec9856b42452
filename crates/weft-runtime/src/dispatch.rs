//! Per-core dispatcher
//!
//! `dispatch()` picks the next runnable context on the calling core and
//! swaps into it. It returns to its caller only when the caller's own
//! context is scheduled again: suspension points (`yield_now`, `sleep`,
//! `block`, `join`) call it to give up the CPU, and the top-level loop
//! calls it to wait for the slot's next invocation.
//!
//! Selection is two-tier: boosted slots from the priority mask first,
//! then round robin over a snapshot of the occupied bitmap. Sleeping
//! and blocked slots fall out of a single `now >= wakeup` comparison
//! because the sentinels are the two largest u64 values.

use core::ptr;
use core::sync::atomic::Ordering;
use std::panic::{self, AssertUnwindSafe};

use weft_core::constants::{BLOCKED, MAX_THREADS_PER_CORE, UNOCCUPIED};
use weft_core::kerror;

use crate::context::ThreadContext;
use crate::core_state::CoreState;
use crate::cycles;
use crate::ops;
use crate::pool;
use crate::runtime::{self, RuntimeInner};
use crate::{arch, tls};

/// Select the next runnable context on this core and swap to it.
///
/// Must be called from a uthread context on a dispatch thread.
pub fn dispatch() {
    let Some(rt) = runtime::runtime() else { return };
    let core = rt.core(tls::kernel_thread_id());
    // Safety: a dispatch thread always has a loaded context.
    let me = unsafe { &*tls::running() };

    me.check_canary();

    // Fast path: boosted slots bypass the round robin.
    if let Some(target) = take_priority_candidate(core) {
        core.account(cycles::rdtsc(), false);
        if ptr::eq(target, me) {
            me.wakeup_time_in_cycles.store(BLOCKED, Ordering::Relaxed);
            return;
        }
        swap_to(target, me);
        return;
    }

    // Slow path: round robin from the per-core cursor.
    let mut index = core.next_candidate_index.load(Ordering::Relaxed) % MAX_THREADS_PER_CORE;
    let mut mask = core.slot_map.occupied() >> index;
    let mut now = cycles::rdtsc();
    let mut examined = 0usize;

    loop {
        if mask == 0 {
            // Completed a pass without a hit: wrap, re-read map, clock
            // and the termination flags.
            index = 0;
            let occupied = core.slot_map.occupied();
            mask = occupied;
            now = cycles::rdtsc();
            core.account(now, true);

            if occupied == 0
                && (rt.shutdown.load(Ordering::Relaxed) || core.draining.load(Ordering::Relaxed))
            {
                exit_to_kernel(core);
            }
            continue;
        }

        let skip = mask.trailing_zeros() as usize;
        if skip > 0 {
            index += skip;
            mask >>= skip;
            continue;
        }

        let ctx = core.context(index);
        examined += 1;
        if now >= ctx.wakeup_time_in_cycles.load(Ordering::Acquire) {
            // A hit this early means the run queue never went dry: the
            // core is loaded, so try to bring another one up.
            if examined < rt.config.core_increase_threshold
                && rt.num_cores_precursor.load(Ordering::Relaxed) < rt.max_num_cores
            {
                pool::try_increment_core_count(rt);
            }
            core.next_candidate_index
                .store((index + 1) % MAX_THREADS_PER_CORE, Ordering::Relaxed);
            core.account(cycles::rdtsc(), false);

            if ptr::eq(ctx, me) {
                me.wakeup_time_in_cycles.store(BLOCKED, Ordering::Relaxed);
                return;
            }
            swap_to(ctx, me);
            return;
        }

        index += 1;
        mask >>= 1;
    }
}

/// Drain the public priority mask into the thread-local private mask and
/// return the first still-valid boosted context. Stale bits are dropped.
fn take_priority_candidate(core: &CoreState) -> Option<&ThreadContext> {
    let mut private = tls::private_mask();
    if private == 0 {
        let public = core.public_priority_mask.load(Ordering::Relaxed);
        if public == 0 {
            return None;
        }
        core.public_priority_mask
            .fetch_and(!public, Ordering::Relaxed);
        private = public;
    }

    while private != 0 {
        let slot = private.trailing_zeros() as usize;
        private &= private - 1;
        let ctx = core.context(slot);
        if core.slot_map.is_occupied(slot as u8)
            && ctx.wakeup_time_in_cycles.load(Ordering::Acquire) == 0
        {
            tls::set_private_mask(private);
            return Some(ctx);
        }
    }
    tls::set_private_mask(0);
    None
}

/// Swap into `target`. Control returns here when some dispatcher on this
/// core schedules `me` again; the first action announces that a future
/// signal must revive us.
fn swap_to(target: &ThreadContext, me: &ThreadContext) {
    tls::set_running(target);
    unsafe { arch::swap(me.sp_cell(), target.sp_cell()) };
    me.wakeup_time_in_cycles.store(BLOCKED, Ordering::Relaxed);
}

/// Shutdown/drain tear-down: resume the kernel thread's own stack so
/// `thread_main` returns. The abandoned uthread context is dead.
fn exit_to_kernel(core: &CoreState) -> ! {
    unsafe { arch::restore(core.kernel_entry_sp.get()) }
}

/// Top-level loop of every uthread context, pre-seeded as the return
/// target of freshly built stacks.
///
/// Each iteration waits in `dispatch` until this slot is scheduled with
/// work, runs the published invocation, then walks the exit path:
/// unoccupy the wakeup word, bump the generation, release joiners, clear
/// the slot bit, and drop any leftover priority boost so a reused slot
/// starts clean.
pub extern "C" fn scheduler_main_loop() -> ! {
    loop {
        // Wait until this slot is scheduled with work. A freshly seeded
        // context enters here from its seed frame too, finds its own
        // published slot, and gets the BLOCKED announcement from the
        // dispatch self-hit. Announcing again here would clobber a
        // signal racing ahead of the first `block`.
        dispatch();

        let me = unsafe { &*tls::running() };
        let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe { me.invocation.run() }));
        if result.is_err() {
            kerror!(
                "uthread on core {} slot {} panicked; treating as exit",
                me.core_id.load(Ordering::Relaxed),
                me.id_in_core
            );
        }

        thread_exit(me);
    }
}

fn thread_exit(me: &ThreadContext) {
    let Some(rt) = runtime::runtime() else {
        // Registry gone while a uthread was live; nothing left to update.
        kerror!("uthread exit raced runtime teardown");
        std::process::abort();
    };
    let core = core_of(rt, me);

    me.wakeup_time_in_cycles
        .store(UNOCCUPIED, Ordering::Release);
    me.generation.fetch_add(1, Ordering::Release);

    {
        let mut waiters = me.join_waiters.lock();
        for id in waiters.drain(..) {
            ops::signal(id);
        }
    }

    // Clearing the bit comes after the joiners are notified: a racing
    // creation must not observe the slot free before the old incarnation
    // is fully retired.
    core.slot_map.release(me.id_in_core);

    let bit = 1u64 << me.id_in_core;
    core.public_priority_mask.fetch_and(!bit, Ordering::Relaxed);
    tls::clear_private_bits(bit);

    core.stats.threads_finished.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn core_of<'a>(rt: &'a RuntimeInner, ctx: &ThreadContext) -> &'a CoreState {
    rt.core(ctx.core_id.load(Ordering::Relaxed) as usize)
}
