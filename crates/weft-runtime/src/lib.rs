//! # weft-runtime
//!
//! Platform-specific implementation of the weft user-space M:N threading
//! runtime:
//!
//! - per-core dispatcher and stack-swapping context switch (arch-specific
//!   naked assembly)
//! - thread contexts, per-core stack regions, slot lifecycle
//! - lock-free cross-core thread creation and placement
//! - load estimation and elastic growth/shrink of the active core set
//!
//! The public application surface is re-exported by the `weft` facade
//! crate; this crate is the machinery.

pub mod config;
pub mod context;
pub mod core_state;
pub mod create;
pub mod cycles;
pub mod dispatch;
pub mod estimator;
pub mod memory;
pub mod monitor;
pub mod ops;
pub mod platform;
pub mod pool;
pub mod runtime;
pub mod stats;
pub mod tls;

pub mod arch;

// Re-exports
pub use config::RuntimeConfig;
pub use context::{ThreadContext, ThreadId};
pub use create::{spawn, spawn_on};
pub use estimator::CoreLoadEstimator;
pub use ops::{block, current_id, join, signal, sleep_ns, yield_now};
pub use runtime::{init, num_active_cores, shut_down, test_destroy, test_init, wait_for_termination};
pub use stats::PerfStats;
