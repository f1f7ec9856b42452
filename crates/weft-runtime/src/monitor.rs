//! Load monitor thread
//!
//! Owns the estimation cadence: wakes every `estimation_interval`,
//! collects a `PerfStats` snapshot, and applies the estimator's verdict
//! through the pool. Exits when the shutdown flag is raised.

use core::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use weft_core::{kdebug, kerror};

use crate::estimator::CoreLoadEstimator;
use crate::pool;
use crate::runtime::RuntimeInner;
use crate::stats;

pub fn spawn_monitor(rt: &'static RuntimeInner) -> Option<JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name("weft-monitor".to_string())
        .spawn(move || monitor_loop(rt));
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            // Elasticity degrades to the dispatcher's fast-hit trigger.
            kerror!("failed to spawn load monitor: {}", e);
            None
        }
    }
}

fn monitor_loop(rt: &'static RuntimeInner) {
    let mut estimator = CoreLoadEstimator::new(rt.max_num_cores, &rt.config);
    loop {
        thread::sleep(rt.config.estimation_interval);
        if rt.shutdown.load(Ordering::Relaxed) {
            return;
        }
        let snapshot = stats::collect(rt);
        let cur = rt.num_cores.load(Ordering::Acquire);
        match estimator.estimate(cur, &snapshot) {
            1 => {
                kdebug!("load monitor: ramping up from {} cores", cur);
                pool::increment_core_count(rt);
            }
            -1 => {
                kdebug!("load monitor: ramping down from {} cores", cur);
                pool::decrement_core_count(rt);
            }
            _ => {}
        }
    }
}
