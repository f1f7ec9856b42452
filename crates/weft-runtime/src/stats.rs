//! Per-core performance counters and their aggregate snapshot
//!
//! Dispatchers book elapsed cycles into relaxed per-core counters at
//! their accounting points (each empty wrap, each swap); creation and
//! exit bump the thread counters. `collect` folds all cores into the
//! `PerfStats` snapshot the load estimator consumes.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::runtime::RuntimeInner;

/// Cumulative counters of one core, cache-line aligned.
#[repr(C, align(64))]
pub struct CoreStats {
    pub total_cycles: AtomicU64,
    pub idle_cycles: AtomicU64,
    /// Elapsed cycles weighted by the occupancy count at accounting time.
    pub weighted_loaded_cycles: AtomicU64,
    pub threads_created: AtomicU64,
    pub threads_finished: AtomicU64,
}

impl CoreStats {
    pub const fn new() -> CoreStats {
        CoreStats {
            total_cycles: AtomicU64::new(0),
            idle_cycles: AtomicU64::new(0),
            weighted_loaded_cycles: AtomicU64::new(0),
            threads_created: AtomicU64::new(0),
            threads_finished: AtomicU64::new(0),
        }
    }
}

impl Default for CoreStats {
    fn default() -> Self {
        CoreStats::new()
    }
}

/// Cross-core snapshot delivered to the estimator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfStats {
    /// Wall time of the collection, ns since runtime init.
    pub collection_time_ns: u64,
    pub total_cycles: u64,
    pub idle_cycles: u64,
    pub weighted_loaded_cycles: u64,
    pub num_threads_created: u64,
    pub num_threads_finished: u64,
}

/// Sum every allocated core's counters into one snapshot.
pub fn collect(rt: &RuntimeInner) -> PerfStats {
    let mut stats = PerfStats {
        collection_time_ns: rt.epoch.elapsed().as_nanos() as u64,
        ..PerfStats::default()
    };
    for core in rt.allocated_cores() {
        stats.total_cycles += core.stats.total_cycles.load(Ordering::Relaxed);
        stats.idle_cycles += core.stats.idle_cycles.load(Ordering::Relaxed);
        stats.weighted_loaded_cycles += core.stats.weighted_loaded_cycles.load(Ordering::Relaxed);
        stats.num_threads_created += core.stats.threads_created.load(Ordering::Relaxed);
        stats.num_threads_finished += core.stats.threads_finished.load(Ordering::Relaxed);
    }
    stats
}
