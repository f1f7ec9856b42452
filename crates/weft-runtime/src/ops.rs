//! Scheduling primitives available to uthreads
//!
//! yield/sleep/block/signal/join, built on the dispatcher. All of them
//! degrade gracefully off-runtime: `yield_now` and `sleep_ns` fall back
//! to their OS equivalents, `block` is a no-op, and `join` spins on the
//! target's generation.

use core::sync::atomic::Ordering;

use weft_core::constants::{CORE_ID_NONE, UNOCCUPIED};

use crate::context::{ThreadContext, ThreadId};
use crate::cycles;
use crate::dispatch::{self, dispatch};
use crate::runtime;
use crate::tls;

#[inline]
fn running_context() -> Option<&'static ThreadContext> {
    unsafe { tls::running().as_ref() }
}

/// Id of the calling uthread, or `ThreadId::NONE` off-runtime.
pub fn current_id() -> ThreadId {
    match running_context() {
        Some(ctx) => ThreadId::new(ctx, ctx.generation.load(Ordering::Relaxed)),
        None => ThreadId::NONE,
    }
}

/// Give up the CPU until the dispatcher's next pass reaches us again.
///
/// When this core has no other occupant the call returns immediately:
/// there is nobody to yield to, and skipping the wakeup-word store and
/// dispatch saves the round trip.
pub fn yield_now() {
    let Some(me) = running_context() else {
        std::thread::yield_now();
        return;
    };
    let Some(rt) = runtime::runtime() else { return };
    let core = dispatch::core_of(rt, me);
    if core.slot_map.num_occupied() <= 1 {
        return;
    }
    me.wakeup_time_in_cycles.store(0, Ordering::Release);
    dispatch();
}

/// Sleep for at least `ns` nanoseconds. No upper bound.
pub fn sleep_ns(ns: u64) {
    let Some(me) = running_context() else {
        std::thread::sleep(std::time::Duration::from_nanos(ns));
        return;
    };
    let deadline = cycles::rdtsc() + cycles::from_ns(ns);
    // A stale signal can wake us early; wait out the remainder so the
    // at-least-ns guarantee holds.
    while cycles::rdtsc() < deadline {
        me.wakeup_time_in_cycles
            .store(deadline, Ordering::Release);
        dispatch();
    }
}

/// Deschedule until `signal` is called on our id.
///
/// Callers must tolerate spurious wakeups: loop on a predicate.
pub fn block() {
    if !tls::is_in_uthread() {
        return;
    }
    // The running context's word is already BLOCKED from the post-swap
    // announcement. A signal racing ahead of this call may have armed it
    // to 0; a store here would lose that wake, so the word is left alone
    // and dispatch re-observes it.
    dispatch();
}

/// Make the thread behind `id` runnable again and boost its priority.
///
/// Stale ids are no-ops when the slot is unoccupied, and otherwise
/// degrade to a spurious early wake of the slot's newer incarnation.
pub fn signal(id: ThreadId) {
    let Some(ctx) = id.context() else { return };

    let observed = ctx.wakeup_time_in_cycles.load(Ordering::Relaxed);
    if observed == UNOCCUPIED {
        return;
    }
    // Single CAS from the observed value, no fences: a lost race means
    // someone else already moved the word.
    let _ = ctx.wakeup_time_in_cycles.compare_exchange(
        observed,
        0,
        Ordering::Relaxed,
        Ordering::Relaxed,
    );

    let core_id = ctx.core_id.load(Ordering::Relaxed);
    if core_id == CORE_ID_NONE {
        return;
    }
    if let Some(core) = runtime::runtime().and_then(|rt| rt.try_core(core_id as usize)) {
        core.public_priority_mask
            .fetch_or(1u64 << ctx.id_in_core, Ordering::Relaxed);
    }
}

/// Wait until the thread behind `id` has exited.
///
/// Returns immediately on a stale id. Off-runtime callers spin on the
/// generation instead of parking a uthread context.
pub fn join(id: ThreadId) {
    let Some(ctx) = id.context() else { return };

    if !tls::is_in_uthread() {
        while ctx.generation.load(Ordering::Acquire) == id.generation() {
            std::thread::yield_now();
        }
        return;
    }

    loop {
        {
            let mut waiters = ctx.join_waiters.lock();
            if ctx.generation.load(Ordering::Acquire) != id.generation() {
                return;
            }
            waiters.push(current_id());
        }
        block();
    }
}
