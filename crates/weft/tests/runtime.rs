//! End-to-end scenarios against the live runtime.
//!
//! The runtime is a process-wide singleton, so every test takes the
//! harness lock and runs a full init/shutdown cycle.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use weft::{RuntimeConfig, RuntimeError};

static HARNESS: Mutex<()> = Mutex::new(());

fn wait_until(what: &str, timeout: Duration, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        assert!(start.elapsed() < timeout, "timed out waiting for {}", what);
        std::thread::yield_now();
    }
}

#[test]
fn test_hello_ping_pong() {
    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    weft::init(RuntimeConfig::default().num_cores(2).max_num_cores(2)).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let log_a = Arc::clone(&log);
    let log_b = Arc::clone(&log);
    weft::spawn(move || log_a.lock().unwrap().push("A")).unwrap();
    weft::spawn(move || log_b.lock().unwrap().push("B")).unwrap();

    weft::shut_down();
    weft::wait_for_termination();

    let mut entries = log.lock().unwrap().clone();
    entries.sort();
    assert_eq!(entries, vec!["A", "B"]);
}

#[test]
fn test_sleep_ordering() {
    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    // One core, so wakeup order is decided purely by the deadlines.
    weft::init(RuntimeConfig::default().num_cores(1).max_num_cores(1)).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    for (index, delay_ms) in [(1usize, 30u64), (2, 10), (3, 20)] {
        let log = Arc::clone(&log);
        weft::spawn(move || {
            weft::sleep(Duration::from_millis(delay_ms));
            log.lock().unwrap().push(index);
        })
        .unwrap();
    }

    wait_until("all sleepers to finish", Duration::from_secs(10), || {
        log.lock().unwrap().len() == 3
    });
    assert_eq!(*log.lock().unwrap(), vec![2, 3, 1]);

    weft::shut_down();
    weft::wait_for_termination();
}

#[test]
fn test_join_after_exit() {
    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    weft::init(RuntimeConfig::default().num_cores(1).max_num_cores(1)).unwrap();

    let id = weft::spawn(|| {}).unwrap();
    std::thread::sleep(Duration::from_millis(5));

    let start = Instant::now();
    weft::join(id);
    assert!(start.elapsed() < Duration::from_secs(2), "join did not return promptly");

    weft::shut_down();
    weft::wait_for_termination();
}

#[test]
fn test_join_releases_waiting_uthread() {
    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    weft::init(RuntimeConfig::default().num_cores(2).max_num_cores(2)).unwrap();

    let joined = Arc::new(AtomicBool::new(false));
    let joined_seen = Arc::clone(&joined);

    let target = weft::spawn(|| weft::sleep(Duration::from_millis(20))).unwrap();
    weft::spawn(move || {
        weft::join(target);
        joined_seen.store(true, Ordering::Release);
    })
    .unwrap();

    wait_until("joiner to be released", Duration::from_secs(10), || {
        joined.load(Ordering::Acquire)
    });

    weft::shut_down();
    weft::wait_for_termination();
}

#[test]
fn test_signal_before_block() {
    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    weft::init(RuntimeConfig::default().num_cores(1).max_num_cores(1)).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let done_set = Arc::clone(&done);
    weft::spawn(move || {
        // The wake arrives before the block; block must consume it and
        // return without external intervention.
        weft::signal(weft::current_id());
        weft::block();
        done_set.store(true, Ordering::Release);
    })
    .unwrap();

    wait_until("pre-armed block to return", Duration::from_secs(10), || {
        done.load(Ordering::Acquire)
    });

    weft::shut_down();
    weft::wait_for_termination();
}

#[test]
fn test_scale_up_under_load() {
    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    weft::init(RuntimeConfig::default().num_cores(1).max_num_cores(4)).unwrap();

    let finished = Arc::new(AtomicUsize::new(0));
    let busy_cycles = 30_000u64; // ~10us of spinning on recent hardware

    let mut peak_cores = weft::num_active_cores();
    let mut launched = 0;
    while launched < 200 {
        let finished = Arc::clone(&finished);
        match weft::spawn(move || {
            let start = now_cycles();
            while now_cycles() - start < busy_cycles {
                core::hint::spin_loop();
            }
            finished.fetch_add(1, Ordering::Relaxed);
        }) {
            Ok(_) => launched += 1,
            Err(RuntimeError::OutOfSlots) => std::thread::yield_now(),
            Err(e) => panic!("spawn failed: {}", e),
        }
        peak_cores = peak_cores.max(weft::num_active_cores());
    }

    wait_until("all 200 uthreads to finish", Duration::from_secs(30), || {
        peak_cores = peak_cores.max(weft::num_active_cores());
        finished.load(Ordering::Relaxed) == 200
    });
    assert!(peak_cores >= 2, "core count never grew: peak {}", peak_cores);

    weft::shut_down();
    weft::wait_for_termination();
}

#[test]
fn test_cross_core_fan_out_fills_every_slot() {
    const THREADS_PER_CORE: usize = 56;
    const CORES: usize = 4;

    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    weft::init(RuntimeConfig::default().num_cores(CORES).max_num_cores(CORES)).unwrap();

    let release = Arc::new(AtomicBool::new(false));
    let mut ids = Vec::new();
    for i in 0..CORES * THREADS_PER_CORE {
        let release = Arc::clone(&release);
        let id = weft::spawn_on(i % CORES, move || {
            while !release.load(Ordering::Acquire) {
                weft::block();
            }
        })
        .expect("every slot in the pool should be reservable");
        ids.push(id);
    }

    // All 4 * 56 slots hold a live thread, so each core's occupancy is at
    // its cap and one more creation must fail everywhere.
    assert_eq!(weft::spawn(|| {}), Err(RuntimeError::OutOfSlots));

    release.store(true, Ordering::Release);
    for id in &ids {
        weft::signal(*id);
    }
    for id in ids {
        weft::join(id);
    }

    weft::shut_down();
    weft::wait_for_termination();
}

#[test]
fn test_single_core_slot_exhaustion() {
    const THREADS_PER_CORE: usize = 56;

    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    weft::init(RuntimeConfig::default().num_cores(1).max_num_cores(1)).unwrap();

    let release = Arc::new(AtomicBool::new(false));
    let mut ids = Vec::new();
    for _ in 0..THREADS_PER_CORE {
        let release = Arc::clone(&release);
        ids.push(
            weft::spawn(move || {
                while !release.load(Ordering::Acquire) {
                    weft::block();
                }
            })
            .unwrap(),
        );
    }
    assert_eq!(weft::spawn_on(0, || {}), Err(RuntimeError::OutOfSlots));

    release.store(true, Ordering::Release);
    for id in &ids {
        weft::signal(*id);
    }
    for id in ids {
        weft::join(id);
    }

    weft::shut_down();
    weft::wait_for_termination();
}

#[test]
fn test_yield_between_uthreads() {
    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    weft::init(RuntimeConfig::default().num_cores(1).max_num_cores(1)).unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let mut ids = Vec::new();
    for _ in 0..2 {
        let counter = Arc::clone(&counter);
        ids.push(
            weft::spawn(move || {
                for _ in 0..100 {
                    counter.fetch_add(1, Ordering::Relaxed);
                    weft::yield_now();
                }
            })
            .unwrap(),
        );
    }
    for id in ids {
        weft::join(id);
    }
    assert_eq!(counter.load(Ordering::Relaxed), 200);

    weft::shut_down();
    weft::wait_for_termination();
}

#[test]
fn test_init_cycles_are_idempotent() {
    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());

    for _ in 0..2 {
        weft::init(RuntimeConfig::default().num_cores(1).max_num_cores(1)).unwrap();
        // Repeated init while up is a no-op.
        weft::init(RuntimeConfig::default().num_cores(1).max_num_cores(1)).unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_set = Arc::clone(&ran);
        let id = weft::spawn(move || ran_set.store(true, Ordering::Release)).unwrap();
        weft::join(id);
        assert!(ran.load(Ordering::Acquire));

        // Repeated shut_down is a no-op.
        weft::shut_down();
        weft::shut_down();
        weft::wait_for_termination();
        assert_eq!(weft::num_active_cores(), 0);
    }
}

#[test]
fn test_create_signal_join_equivalence() {
    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    weft::init(RuntimeConfig::default().num_cores(1).max_num_cores(1)).unwrap();

    // A thread that never blocks behaves the same with or without a
    // racing signal: the entry runs exactly once and join returns.
    for with_signal in [false, true] {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_inner = Arc::clone(&hits);
        let id = weft::spawn(move || {
            hits_inner.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        if with_signal {
            weft::signal(id);
        }
        weft::join(id);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    weft::shut_down();
    weft::wait_for_termination();
}

#[test]
fn test_current_id_off_runtime_is_none() {
    let _guard = HARNESS.lock().unwrap_or_else(|e| e.into_inner());
    assert!(weft::current_id().is_none());
    // Stale-id operations off-runtime are harmless no-ops.
    weft::signal(weft::ThreadId::NONE);
    weft::join(weft::ThreadId::NONE);
}

fn now_cycles() -> u64 {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::x86_64::_rdtsc()
    }
    #[cfg(target_arch = "aarch64")]
    unsafe {
        let cnt: u64;
        core::arch::asm!("mrs {}, cntvct_el0", out(reg) cnt, options(nomem, nostack));
        cnt
    }
}
