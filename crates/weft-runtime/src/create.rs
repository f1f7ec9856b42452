//! Thread creation and placement
//!
//! Creation is lock-free: reserve a slot with one CAS on the target
//! core's packed word, write the entry closure in place, then publish the
//! slot runnable with a release store of `0` to the wakeup word. That
//! release/acquire pair with the target dispatcher is the only cross-core
//! ordering the path needs.

use core::sync::atomic::Ordering;

use weft_core::error::{RuntimeError, RuntimeResult};

use crate::context::ThreadId;
use crate::core_state::CoreState;
use crate::runtime::{self, RuntimeInner};

/// Create a uthread somewhere in the active core set.
pub fn spawn<F>(f: F) -> RuntimeResult<ThreadId>
where
    F: FnOnce() + Send + 'static,
{
    spawn_impl(None, f)
}

/// Create a uthread, preferring `core`. Falls back to the placement
/// policy when the preferred core is full or draining.
pub fn spawn_on<F>(core: usize, f: F) -> RuntimeResult<ThreadId>
where
    F: FnOnce() + Send + 'static,
{
    spawn_impl(Some(core), f)
}

fn spawn_impl<F>(target: Option<usize>, f: F) -> RuntimeResult<ThreadId>
where
    F: FnOnce() + Send + 'static,
{
    if !runtime::is_initialized() {
        return Err(RuntimeError::NotInitialized);
    }
    let Some(rt) = runtime::runtime() else {
        return Err(RuntimeError::NotInitialized);
    };

    let num_cores = rt.num_cores.load(Ordering::Acquire);
    if num_cores == 0 {
        return Err(RuntimeError::NotInitialized);
    }

    let mut reserved = None;
    if let Some(preferred) = target {
        if preferred < num_cores {
            reserved = try_reserve(rt, preferred);
        }
    }
    if reserved.is_none() {
        // Round robin from the advancing cursor, skipping full and
        // draining cores.
        let start = rt.next_placement.fetch_add(1, Ordering::Relaxed);
        for i in 0..num_cores {
            reserved = try_reserve(rt, (start + i) % num_cores);
            if reserved.is_some() {
                break;
            }
        }
    }
    let Some((core, slot)) = reserved else {
        return Err(RuntimeError::OutOfSlots);
    };

    // Exclusive ownership of the slot from here to the publish.
    let ctx = core.context(slot as usize);
    let generation = ctx.generation.load(Ordering::Acquire);

    // Safety: we are the reserver; the dispatcher cannot observe the slot
    // until the release store below.
    if let Err(e) = unsafe { ctx.invocation.write(f) } {
        core.slot_map.release(slot);
        return Err(e);
    }

    core.stats.threads_created.fetch_add(1, Ordering::Relaxed);
    ctx.wakeup_time_in_cycles.store(0, Ordering::Release);

    Ok(ThreadId::new(ctx, generation))
}

fn try_reserve(rt: &RuntimeInner, index: usize) -> Option<(&CoreState, u8)> {
    let core = rt.try_core(index)?;
    if core.draining.load(Ordering::Relaxed) {
        return None;
    }
    core.slot_map.reserve().map(|slot| (core, slot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use crate::runtime::{test_destroy, test_init};
    use std::sync::Mutex;

    use weft_core::constants::{MAX_THREADS_PER_CORE, UNOCCUPIED};

    // The registry is a process singleton; harness tests take turns.
    static HARNESS: Mutex<()> = Mutex::new(());

    #[test]
    fn test_spawn_requires_init() {
        let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(spawn(|| {}), Err(RuntimeError::NotInitialized));
    }

    #[test]
    fn test_spawn_publishes_slot() {
        let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
        test_init();

        let id = spawn(|| {}).unwrap();
        assert!(id.is_some());

        let rt = runtime::runtime().unwrap();
        let core = rt.core(0);
        assert_eq!(core.slot_map.num_occupied(), 1);
        assert!(core.slot_map.is_occupied(0));
        // Published runnable-now.
        assert_eq!(
            core.context(0).wakeup_time_in_cycles.load(Ordering::Relaxed),
            0
        );
        assert_eq!(core.stats.threads_created.load(Ordering::Relaxed), 1);

        test_destroy();
    }

    #[test]
    fn test_out_of_slots_on_full_core() {
        let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
        test_init();

        for _ in 0..MAX_THREADS_PER_CORE {
            spawn(|| {}).unwrap();
        }
        assert_eq!(spawn(|| {}), Err(RuntimeError::OutOfSlots));
        assert_eq!(spawn_on(0, || {}), Err(RuntimeError::OutOfSlots));

        test_destroy();
    }

    #[test]
    fn test_oversized_invocation_releases_slot() {
        let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
        test_init();

        let big = [0u8; 4096];
        let result = spawn(move || {
            let _ = big.len();
        });
        assert_eq!(result, Err(RuntimeError::InvocationTooLarge));

        let rt = runtime::runtime().unwrap();
        assert!(rt.core(0).slot_map.is_empty());

        test_destroy();
    }

    #[test]
    fn test_signal_on_unoccupied_slot_is_noop() {
        let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
        test_init();

        let id = spawn(|| {}).unwrap();
        let rt = runtime::runtime().unwrap();
        let ctx = rt.core(0).context(0);

        // Retire the slot the way the exit path would.
        ctx.wakeup_time_in_cycles.store(UNOCCUPIED, Ordering::Release);
        ops::signal(id);
        assert_eq!(ctx.wakeup_time_in_cycles.load(Ordering::Relaxed), UNOCCUPIED);

        test_destroy();
    }

    #[test]
    fn test_signal_arms_blocked_slot() {
        let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
        test_init();

        let id = spawn(|| {}).unwrap();
        let rt = runtime::runtime().unwrap();
        let ctx = rt.core(0).context(0);

        ctx.wakeup_time_in_cycles
            .store(weft_core::constants::BLOCKED, Ordering::Release);
        ops::signal(id);
        assert_eq!(ctx.wakeup_time_in_cycles.load(Ordering::Relaxed), 0);

        test_destroy();
    }

    #[test]
    fn test_join_returns_on_stale_generation() {
        let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
        test_init();

        let id = spawn(|| {}).unwrap();
        let rt = runtime::runtime().unwrap();
        let ctx = rt.core(0).context(0);

        // Exit bumps the generation; the old id is then stale and join
        // must return without waiting.
        ctx.generation.fetch_add(1, Ordering::Release);
        ops::join(id);

        test_destroy();
    }

    #[test]
    fn test_threads_created_counter_accumulates() {
        let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
        test_init();

        for _ in 0..5 {
            spawn(|| {}).unwrap();
        }
        let rt = runtime::runtime().unwrap();
        assert_eq!(rt.core(0).stats.threads_created.load(Ordering::Relaxed), 5);

        test_destroy();
    }
}
