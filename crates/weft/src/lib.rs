//! # weft - user-space M:N threading
//!
//! A runtime for latency-sensitive server workloads where very
//! short-lived tasks (microsecond scale) are multiplexed over a bounded,
//! elastic pool of dedicated CPUs. Uthreads are strictly cooperative:
//! they give up their CPU only at `yield_now`, `sleep`, `block`, `join`
//! or by returning from their entry closure, and a hand-rolled context
//! switch swaps user stacks directly, with no kernel involvement.
//!
//! ## Quick start
//!
//! ```ignore
//! use weft::{Runtime, RuntimeConfig};
//!
//! fn main() {
//!     let mut runtime = Runtime::new(RuntimeConfig::default().num_cores(2))
//!         .expect("runtime init");
//!
//!     runtime.block_on(|| {
//!         let id = weft::spawn(|| {
//!             println!("hello from a uthread");
//!             weft::yield_now();
//!             println!("and again");
//!         })
//!         .expect("spawn");
//!         weft::join(id);
//!     });
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       User code                          │
//! │     spawn / yield_now / sleep / block / signal / join    │
//! └──────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │              Per-core dispatcher (one per CPU)           │
//! │   priority fast path · round robin · stack swap (asm)    │
//! └──────────────────────────────────────────────────────────┘
//!          │                  │                   │
//!          ▼                  ▼                   ▼
//!    ┌──────────┐       ┌──────────┐       ┌────────────┐
//!    │  core 0  │  ...  │  core N  │       │  monitor   │
//!    │ 56 slots │       │ 56 slots │       │ (estimator)│
//!    └──────────┘       └──────────┘       └────────────┘
//! ```
//!
//! Caveats that are contracts, not bugs: floating-point registers are
//! not preserved across suspension points; `block` can wake spuriously
//! (loop on a predicate); a `ThreadId` outliving its thread degrades
//! `signal`/`join` to no-ops.

// Re-export core types
pub use weft_core::error::{RuntimeError, RuntimeResult};
pub use weft_core::kprint::{self, set_log_level, LogLevel};
pub use weft_core::{kdebug, kerror, kinfo, kprintln, ktrace, kwarn};

// Re-export runtime surface
pub use weft_runtime::config::RuntimeConfig;
pub use weft_runtime::context::ThreadId;
pub use weft_runtime::create::{spawn, spawn_on};
pub use weft_runtime::ops::{block, current_id, join, signal, sleep_ns, yield_now};
pub use weft_runtime::runtime::{
    init, num_active_cores, shut_down, test_destroy, test_init, wait_for_termination,
};
pub use weft_runtime::stats::PerfStats;

use std::io::Write;
use std::time::Duration;

/// Sleep for at least `duration`. No upper bound.
pub fn sleep(duration: Duration) {
    sleep_ns(duration.as_nanos() as u64);
}

/// Redirect the runtime's log output away from stderr.
pub fn set_error_stream(stream: Box<dyn Write + Send>) {
    weft_core::kprint::set_error_stream(stream);
}

/// RAII handle over the runtime lifecycle.
///
/// `new` initializes the runtime and spawns the dispatch threads;
/// dropping the handle shuts it down and waits for termination.
pub struct Runtime {
    terminated: bool,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> RuntimeResult<Runtime> {
        init(config)?;
        Ok(Runtime { terminated: false })
    }

    /// Run `f` with the runtime active, then shut down and wait.
    pub fn block_on<F, T>(&mut self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let result = f();
        self.shutdown();
        result
    }

    /// Shut down and wait for termination. Idempotent.
    pub fn shutdown(&mut self) {
        if !self.terminated {
            self.terminated = true;
            shut_down();
            wait_for_termination();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
