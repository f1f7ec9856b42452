//! Core load estimator
//!
//! Consumes successive `PerfStats` snapshots and suggests whether the
//! active core count should shrink (-1), hold (0) or grow (+1).
//!
//! The ramp-down hysteresis works through `utilization_thresholds`: each
//! scale-up records the utilization at which it happened, and the set
//! only shrinks once utilization falls measurably below that remembered
//! high-water mark while slot occupancy is low too.

use weft_core::constants::MAX_THREADS_PER_CORE;

use crate::config::RuntimeConfig;
use crate::cycles;
use crate::stats::PerfStats;

pub struct CoreLoadEstimator {
    previous: Option<PerfStats>,

    /// Utilization recorded at each scale-up, indexed by the core count
    /// in effect when the decision was made.
    utilization_thresholds: Vec<f64>,

    load_factor_threshold: f64,
    idle_core_fraction_hysteresis: f64,
    slot_occupancy_threshold: f64,
}

impl CoreLoadEstimator {
    pub fn new(max_num_cores: usize, config: &RuntimeConfig) -> CoreLoadEstimator {
        CoreLoadEstimator {
            previous: None,
            utilization_thresholds: vec![0.0; max_num_cores],
            load_factor_threshold: config.load_factor_threshold,
            idle_core_fraction_hysteresis: config.idle_core_fraction_hysteresis,
            slot_occupancy_threshold: config.slot_occupancy_threshold,
        }
    }

    /// Suggest -1, 0 or +1 for the active core count, given the current
    /// snapshot. The first call only records a baseline.
    pub fn estimate(&mut self, cur_active_cores: usize, current: &PerfStats) -> i32 {
        let Some(prev) = self.previous.replace(*current) else {
            return 0;
        };

        let idle_cycles = current.idle_cycles.wrapping_sub(prev.idle_cycles);
        let total_cycles = current.total_cycles.wrapping_sub(prev.total_cycles);
        let utilized_cycles = total_cycles.saturating_sub(idle_cycles);
        let measurement_cycles = cycles::from_ns(
            current
                .collection_time_ns
                .wrapping_sub(prev.collection_time_ns),
        );
        if measurement_cycles == 0 || total_cycles == 0 || cur_active_cores == 0 {
            return 0;
        }

        // Fractional CPUs busy over the interval.
        let total_utilized_cores = utilized_cycles as f64 / measurement_cycles as f64;

        // Mean runnable occupancy per core over the interval: both sums
        // span all cores, so their ratio is already per-core.
        let weighted_loaded_cycles = current
            .weighted_loaded_cycles
            .wrapping_sub(prev.weighted_loaded_cycles);
        let average_load_factor = weighted_loaded_cycles as f64 / total_cycles as f64;

        if cur_active_cores < self.utilization_thresholds.len()
            && average_load_factor > self.load_factor_threshold
        {
            // Remember the utilization we scaled up at; ramping back down
            // requires falling below it.
            self.utilization_thresholds[cur_active_cores] = total_utilized_cores;
            return 1;
        }

        let live_threads = current
            .num_threads_created
            .saturating_sub(current.num_threads_finished);
        let average_num_slots_used =
            live_threads as f64 / cur_active_cores as f64 / MAX_THREADS_PER_CORE as f64;

        if total_utilized_cores
            < self.utilization_thresholds[cur_active_cores - 1] - self.idle_core_fraction_hysteresis
            && average_num_slots_used < self.slot_occupancy_threshold
        {
            return -1;
        }
        0
    }

    /// Forget history; the next `estimate` call returns 0.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL_NS: u64 = 100_000_000;

    fn estimator(max: usize) -> CoreLoadEstimator {
        CoreLoadEstimator::new(max, &RuntimeConfig::default())
    }

    /// Advance the cumulative counters by one interval in which `cores`
    /// dispatchers ran with the given idle fraction and load factor.
    fn advance(acc: &mut PerfStats, cores: u64, idle_fraction: f64, load_factor: f64) -> PerfStats {
        let interval = cycles::from_ns(INTERVAL_NS) * cores;
        acc.collection_time_ns += INTERVAL_NS;
        acc.total_cycles += interval;
        acc.idle_cycles += (interval as f64 * idle_fraction) as u64;
        acc.weighted_loaded_cycles += (interval as f64 * load_factor) as u64;
        *acc
    }

    #[test]
    fn test_first_call_records_baseline() {
        let mut est = estimator(4);
        let mut acc = PerfStats::default();
        assert_eq!(est.estimate(1, &advance(&mut acc, 1, 0.0, 5.0)), 0);
        // The second call acts on the delta.
        assert_eq!(est.estimate(1, &advance(&mut acc, 1, 0.0, 5.0)), 1);
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut est = estimator(4);
        let mut acc = PerfStats::default();
        est.estimate(1, &advance(&mut acc, 1, 0.0, 5.0));
        est.reset();
        assert_eq!(est.estimate(1, &advance(&mut acc, 1, 0.0, 5.0)), 0);
    }

    #[test]
    fn test_ramp_up_on_load_factor() {
        let mut est = estimator(4);
        let mut acc = PerfStats::default();
        est.estimate(2, &advance(&mut acc, 2, 0.0, 0.0));
        // Runnable threads queueing behind every core: load factor above 1.
        assert_eq!(est.estimate(2, &advance(&mut acc, 2, 0.0, 3.0)), 1);
    }

    #[test]
    fn test_no_ramp_up_at_max_cores() {
        let mut est = estimator(2);
        let mut acc = PerfStats::default();
        est.estimate(2, &advance(&mut acc, 2, 0.0, 0.0));
        assert_eq!(est.estimate(2, &advance(&mut acc, 2, 0.0, 3.0)), 0);
    }

    #[test]
    fn test_ramp_down_needs_recorded_threshold_and_idle() {
        let mut est = estimator(4);
        let mut acc = PerfStats::default();

        // Baseline, then scale up at full utilization of one core.
        est.estimate(1, &advance(&mut acc, 1, 0.0, 0.0));
        assert_eq!(est.estimate(1, &advance(&mut acc, 1, 0.0, 3.0)), 1);

        // Two cores, mostly idle, no live threads: shrink.
        assert_eq!(est.estimate(2, &advance(&mut acc, 2, 0.9, 0.1)), -1);
    }

    #[test]
    fn test_slot_occupancy_vetoes_ramp_down() {
        let mut est = estimator(4);
        let mut acc = PerfStats::default();
        est.estimate(1, &advance(&mut acc, 1, 0.0, 0.0));
        assert_eq!(est.estimate(1, &advance(&mut acc, 1, 0.0, 3.0)), 1);

        // Idle, but every slot holds a live thread.
        acc.num_threads_created = 2 * MAX_THREADS_PER_CORE as u64;
        let idle = advance(&mut acc, 2, 0.9, 0.1);
        assert_eq!(est.estimate(2, &idle), 0);
    }

    #[test]
    fn test_holds_steady_under_moderate_load() {
        let mut est = estimator(4);
        let mut acc = PerfStats::default();
        est.estimate(2, &advance(&mut acc, 2, 0.0, 0.0));
        // Load factor below threshold, no recorded high-water mark.
        assert_eq!(est.estimate(2, &advance(&mut acc, 2, 0.3, 0.6)), 0);
    }
}
