//! Global runtime state: the core registry and lifecycle surface
//!
//! The registry is a fixed-capacity array of core pointers sized
//! `max_num_cores` at init, so readers (dispatchers, placement, signal)
//! index it without locks while growth appends under the core-change
//! mutex. `num_cores` is the active prefix length; `num_cores_precursor`
//! additionally counts cores still being set up by a joining kernel
//! thread.

use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, AtomicUsize, Ordering};
use std::ptr;
use std::thread::JoinHandle;
use std::time::Instant;

use weft_core::error::RuntimeResult;
use weft_core::kinfo;
use weft_core::spinlock::SpinLock;

use crate::config::RuntimeConfig;
use crate::core_state::CoreState;
use crate::monitor;
use crate::pool;

const NOT_INITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const INITIALIZED: u8 = 2;

static INIT_STATE: AtomicU8 = AtomicU8::new(NOT_INITIALIZED);
static RUNTIME: AtomicPtr<RuntimeInner> = AtomicPtr::new(ptr::null_mut());

/// Thread handles owned by the runtime, guarded by the core-change mutex.
#[derive(Default)]
pub struct CoreChange {
    pub kernel_threads: Vec<JoinHandle<()>>,
    pub monitor: Option<JoinHandle<()>>,
}

pub struct RuntimeInner {
    pub config: RuntimeConfig,
    pub max_num_cores: usize,

    /// Append-only registry; entries are allocated lazily and never move.
    cores: Box<[AtomicPtr<CoreState>]>,

    /// Length of the active prefix of `cores`.
    pub num_cores: AtomicUsize,

    /// `>= num_cores`; reserves the next index while a joining kernel
    /// thread is still setting up.
    pub num_cores_precursor: AtomicUsize,

    pub shutdown: AtomicBool,

    /// Serializes registry growth and shrink.
    pub core_change: SpinLock<CoreChange>,

    /// Advancing cursor of the round-robin placement policy.
    pub next_placement: AtomicUsize,

    /// Wall-clock anchor for stat collection times.
    pub epoch: Instant,

    /// Single-threaded harness registry: no kernel threads, no monitor.
    pub test_mode: bool,
}

impl RuntimeInner {
    fn new(config: RuntimeConfig, test_mode: bool) -> RuntimeInner {
        let max = config.max_num_cores;
        RuntimeInner {
            max_num_cores: max,
            cores: (0..max).map(|_| AtomicPtr::new(ptr::null_mut())).collect(),
            num_cores: AtomicUsize::new(0),
            num_cores_precursor: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            core_change: SpinLock::new(CoreChange::default()),
            next_placement: AtomicUsize::new(0),
            epoch: Instant::now(),
            test_mode,
            config,
        }
    }

    /// The core at an active index. The caller must know the index is
    /// within the active prefix (or at least allocated).
    #[inline]
    pub fn core(&self, id: usize) -> &CoreState {
        let ptr = self.cores[id].load(Ordering::Acquire);
        debug_assert!(!ptr.is_null());
        unsafe { &*ptr }
    }

    #[inline]
    pub fn try_core(&self, id: usize) -> Option<&CoreState> {
        if id >= self.max_num_cores {
            return None;
        }
        unsafe { self.cores[id].load(Ordering::Acquire).as_ref() }
    }

    /// Every allocated core, active or parked.
    pub fn allocated_cores(&self) -> impl Iterator<Item = &CoreState> {
        self.cores
            .iter()
            .filter_map(|slot| unsafe { slot.load(Ordering::Acquire).as_ref() })
    }

    pub(crate) fn install_core(&self, id: usize, core: Box<CoreState>) -> &CoreState {
        let raw = Box::into_raw(core);
        self.cores[id].store(raw, Ordering::Release);
        unsafe { &*raw }
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        for slot in self.cores.iter() {
            let ptr = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !ptr.is_null() {
                drop(unsafe { Box::from_raw(ptr) });
            }
        }
    }
}

/// The live runtime, if initialized (or initializing).
#[inline]
pub fn runtime() -> Option<&'static RuntimeInner> {
    unsafe { RUNTIME.load(Ordering::Acquire).as_ref() }
}

/// True once `init` has fully completed.
#[inline]
pub fn is_initialized() -> bool {
    INIT_STATE.load(Ordering::Acquire) == INITIALIZED
}

/// Initialize the runtime and spawn the initial kernel dispatch threads.
///
/// Idempotent: a second call while the runtime is up succeeds without
/// effect. Blocks until every initial core has joined the pool.
pub fn init(config: RuntimeConfig) -> RuntimeResult<()> {
    if INIT_STATE
        .compare_exchange(
            NOT_INITIALIZED,
            INITIALIZING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_err()
    {
        // Someone else owns initialization; wait it out.
        while INIT_STATE.load(Ordering::Acquire) == INITIALIZING {
            std::thread::yield_now();
        }
        return Ok(());
    }

    if let Err(e) = config.validate() {
        INIT_STATE.store(NOT_INITIALIZED, Ordering::SeqCst);
        return Err(e);
    }
    weft_core::kprint::init();
    // Calibrate the cycle clock now, not on a dispatcher's first sleep.
    crate::cycles::per_second();

    let target = config.num_cores;
    let rt: &'static RuntimeInner = Box::leak(Box::new(RuntimeInner::new(config, false)));
    RUNTIME.store(rt as *const _ as *mut _, Ordering::Release);

    for _ in 0..target {
        pool::increment_core_count(rt);
    }
    while rt.num_cores.load(Ordering::Acquire) < target {
        std::thread::yield_now();
    }

    if rt.max_num_cores > 1 {
        let handle = monitor::spawn_monitor(rt);
        rt.core_change.lock().monitor = handle;
    }

    kinfo!(
        "runtime up: {} cores active, {} max",
        target,
        rt.max_num_cores
    );
    INIT_STATE.store(INITIALIZED, Ordering::SeqCst);
    Ok(())
}

/// Raise the shutdown flag. Callable from anywhere; repeats are no-ops.
pub fn shut_down() {
    if let Some(rt) = runtime() {
        rt.shutdown.store(true, Ordering::Release);
    }
}

/// Block until shutdown completes, then release everything the runtime
/// owns and return to the uninitialized state.
pub fn wait_for_termination() {
    let Some(rt) = runtime() else { return };

    if !rt.test_mode {
        let monitor = rt.core_change.lock().monitor.take();
        if let Some(handle) = monitor {
            let _ = handle.join();
        }
        // Kernel threads exit once shutdown is visible and their cores
        // drain; a late ramp-up can add handles while we join, so loop
        // until none remain.
        loop {
            let handles = std::mem::take(&mut rt.core_change.lock().kernel_threads);
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.join();
            }
        }
    }
    teardown();
}

fn teardown() {
    let ptr = RUNTIME.swap(ptr::null_mut(), Ordering::AcqRel);
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr) });
    }
    INIT_STATE.store(NOT_INITIALIZED, Ordering::SeqCst);
}

/// Number of currently active cores.
pub fn num_active_cores() -> usize {
    runtime()
        .map(|rt| rt.num_cores.load(Ordering::Acquire))
        .unwrap_or(0)
}

/// Set up a single-core registry with no kernel threads, for
/// single-threaded test harnesses. Contexts stay unattached
/// (`core_id == CORE_ID_NONE`).
pub fn test_init() {
    if INIT_STATE
        .compare_exchange(
            NOT_INITIALIZED,
            INITIALIZING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_err()
    {
        return;
    }
    let config = RuntimeConfig::default()
        .num_cores(1)
        .max_num_cores(1)
        .stack_size(64 * 1024);
    let rt: &'static RuntimeInner = Box::leak(Box::new(RuntimeInner::new(config, true)));
    rt.install_core(0, CoreState::allocate(0, rt.config.stack_size));
    rt.num_cores.store(1, Ordering::Release);
    rt.num_cores_precursor.store(1, Ordering::Release);
    RUNTIME.store(rt as *const _ as *mut _, Ordering::Release);
    INIT_STATE.store(INITIALIZED, Ordering::SeqCst);
}

/// Tear down a `test_init` registry.
pub fn test_destroy() {
    let Some(rt) = runtime() else { return };
    debug_assert!(rt.test_mode, "test_destroy on a live runtime");
    teardown();
}
