//! Platform glue: CPU pinning
//!
//! Each kernel dispatch thread is pinned to one CPU so the per-core
//! invariants hold on the hardware too. Best effort: a failed pin is
//! logged and the runtime keeps going unpinned.

use weft_core::kwarn;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub fn pin_to_cpu(core_id: usize) {
            unsafe {
                let online = libc::sysconf(libc::_SC_NPROCESSORS_ONLN);
                let cpus = if online > 0 { online as usize } else { 1 };

                let mut set: libc::cpu_set_t = std::mem::zeroed();
                libc::CPU_ZERO(&mut set);
                libc::CPU_SET(core_id % cpus, &mut set);
                let rc = libc::sched_setaffinity(
                    0,
                    std::mem::size_of::<libc::cpu_set_t>(),
                    &set,
                );
                if rc != 0 {
                    kwarn!("failed to pin kernel thread to cpu {}", core_id % cpus);
                }
            }
        }
    } else {
        pub fn pin_to_cpu(_core_id: usize) {
            // No portable affinity interface; dispatchers run unpinned.
        }
    }
}
