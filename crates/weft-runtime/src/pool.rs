//! Elastic kernel-thread pool
//!
//! Growth: reserve the next registry index by bumping the precursor
//! under the core-change mutex, then spawn a kernel thread that runs
//! `join_kernel_thread_pool` - allocate (or re-seed) the core state,
//! claim `num_cores`, attach the contexts, pin, and swap onto the first
//! context's stack to start dispatching.
//!
//! Shrink: mark the highest active core draining and pull it out of the
//! active prefix. Placement stops seeing it, its slot map drains, and
//! its dispatcher exits through the kernel-entry restore once empty.

use core::sync::atomic::Ordering;
use std::thread;

use weft_core::{kdebug, kerror};

use crate::core_state::CoreState;
use crate::cycles;
use crate::platform;
use crate::runtime::RuntimeInner;
use crate::{arch, tls};

/// Ramp-up attempt from the dispatcher's fast-hit trigger. Never blocks:
/// a contended mutex means somebody else is already changing the pool.
pub fn try_increment_core_count(rt: &'static RuntimeInner) {
    if let Some(guard) = rt.core_change.try_lock() {
        increment_locked(rt, guard);
    }
}

/// Blocking ramp-up, used by init and the load monitor.
pub fn increment_core_count(rt: &'static RuntimeInner) {
    let guard = rt.core_change.lock();
    increment_locked(rt, guard);
}

fn increment_locked(
    rt: &'static RuntimeInner,
    mut guard: weft_core::spinlock::SpinLockGuard<'_, crate::runtime::CoreChange>,
) {
    if rt.shutdown.load(Ordering::Relaxed) {
        return;
    }
    let precursor = rt.num_cores_precursor.load(Ordering::Relaxed);
    if precursor >= rt.max_num_cores {
        return;
    }
    rt.num_cores_precursor
        .store(precursor + 1, Ordering::Relaxed);

    let spawned = thread::Builder::new()
        .name(format!("weft-core-{}", precursor))
        .spawn(move || join_kernel_thread_pool(rt));
    match spawned {
        Ok(handle) => guard.kernel_threads.push(handle),
        Err(e) => {
            rt.num_cores_precursor.store(precursor, Ordering::Relaxed);
            kerror!("failed to spawn kernel dispatch thread: {}", e);
        }
    }
}

/// Ramp-down: drain the highest active core. Refuses below one core and
/// while another pool change is still in flight.
pub fn decrement_core_count(rt: &'static RuntimeInner) {
    let _guard = rt.core_change.lock();
    let num = rt.num_cores.load(Ordering::Relaxed);
    if num <= 1 {
        return;
    }
    if rt.num_cores_precursor.load(Ordering::Relaxed) != num {
        // A joining kernel thread is still setting up; its index would
        // collide with the one we are about to retire.
        return;
    }
    let victim = num - 1;
    rt.core(victim).draining.store(true, Ordering::Release);
    rt.num_cores.store(victim, Ordering::Release);
    rt.num_cores_precursor.store(victim, Ordering::Relaxed);
    kdebug!("ramping down: draining core {}", victim);
}

/// Body of a kernel dispatch thread: register a core, then host its
/// dispatcher until shutdown or drain.
fn join_kernel_thread_pool(rt: &'static RuntimeInner) {
    let (core, id) = {
        let _guard = rt.core_change.lock();
        let id = rt.num_cores.load(Ordering::Relaxed);

        let core: &CoreState = match rt.try_core(id) {
            // Parked from an earlier drain; fresh seed frames, same
            // generations.
            Some(parked) => {
                parked.reseed();
                parked
            }
            None => rt.install_core(id, CoreState::allocate(id as u8, rt.config.stack_size)),
        };
        for ctx in core.contexts() {
            ctx.core_id.store(id as u8, Ordering::Release);
        }
        rt.num_cores.store(id + 1, Ordering::Release);
        (core, id)
    };

    platform::pin_to_cpu(id);
    tls::set_kernel_thread_id(id);
    tls::set_private_mask(0);
    tls::set_running(core.context(0));
    core.last_stamp.store(cycles::rdtsc(), Ordering::Relaxed);
    kdebug!("core {} joined the pool", id);

    // Hand the CPU to the first context's seeded stack; control returns
    // here when its dispatcher exits through the shutdown or drain path.
    unsafe { arch::swap(core.kernel_entry_sp.get(), core.context(0).sp_cell()) };

    tls::clear_running();
    tls::clear_kernel_thread_id();
    tls::set_private_mask(0);
    kdebug!("core {} left the pool", id);
}
