//! Monotonic cycle clock
//!
//! The dispatcher encodes sleep deadlines as absolute cycle counts, so it
//! needs a raw counter read (a handful of cycles) plus ns conversion.
//! On x86_64 the TSC frequency is measured once against the OS clock; on
//! aarch64 the generic timer advertises its own frequency.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Read the monotonic cycle counter.
#[inline]
pub fn rdtsc() -> u64 {
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

/// Counter ticks per second, calibrated once.
pub fn per_second() -> u64 {
    static CYCLES_PER_SECOND: OnceLock<u64> = OnceLock::new();
    *CYCLES_PER_SECOND.get_or_init(calibrate)
}

#[cfg(target_arch = "x86_64")]
fn calibrate() -> u64 {
    // Measure the TSC over a 10ms wall-clock window.
    let window = Duration::from_millis(10);
    let start = Instant::now();
    let c0 = rdtsc();
    while start.elapsed() < window {
        core::hint::spin_loop();
    }
    let c1 = rdtsc();
    let elapsed_ns = start.elapsed().as_nanos() as u64;
    ((c1 - c0) as u128 * 1_000_000_000u128 / elapsed_ns as u128) as u64
}

#[cfg(target_arch = "aarch64")]
fn calibrate() -> u64 {
    unsafe {
        let freq: u64;
        core::arch::asm!("mrs {}, cntfrq_el0", out(reg) freq, options(nomem, nostack));
        freq
    }
}

/// Convert a nanosecond duration to cycles.
#[inline]
pub fn from_ns(ns: u64) -> u64 {
    (ns as u128 * per_second() as u128 / 1_000_000_000u128) as u64
}

/// Convert a cycle count to nanoseconds.
#[inline]
pub fn to_ns(cycles: u64) -> u64 {
    (cycles as u128 * 1_000_000_000u128 / per_second() as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_is_monotonic() {
        let a = rdtsc();
        let b = rdtsc();
        assert!(b >= a);
    }

    #[test]
    fn test_conversion_round_trip() {
        let cps = per_second();
        assert!(cps > 1_000_000, "implausible cycle rate: {}", cps);

        let ns = 5_000_000u64;
        let cycles = from_ns(ns);
        let back = to_ns(cycles);
        // Integer rounding only; the round trip stays within 1us.
        assert!(back.abs_diff(ns) < 1_000, "{} vs {}", back, ns);
    }

    #[test]
    fn test_counter_tracks_wall_clock() {
        let start = rdtsc();
        std::thread::sleep(Duration::from_millis(20));
        let elapsed_ns = to_ns(rdtsc() - start);
        assert!(elapsed_ns >= 15_000_000, "only {}ns elapsed", elapsed_ns);
    }
}
