//! # weft-core
//!
//! Core types for the weft user-space M:N threading runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The dispatcher, context switching, and memory management live in
//! `weft-runtime`.
//!
//! ## Modules
//!
//! - `slot_map` - packed per-core occupancy word (bitmap + exact count)
//! - `invocation` - in-place erased closure storage for thread creation
//! - `error` - error types
//! - `spinlock` - internal spinlock primitive
//! - `kprint` - kernel-style leveled print macros
//! - `env` - environment variable utilities

pub mod env;
pub mod error;
pub mod invocation;
pub mod kprint;
pub mod slot_map;
pub mod spinlock;

// Re-exports for convenience
pub use error::{RuntimeError, RuntimeResult};
pub use invocation::InvocationSlot;
pub use slot_map::SlotMap;
pub use spinlock::SpinLock;

/// Constants shared by the whole runtime
pub mod constants {
    /// Number of thread slots per core: 56 occupancy bits leave 8 bits of
    /// exact count in the same 64-bit word.
    pub const MAX_THREADS_PER_CORE: usize = 56;

    /// Hard cap on the core registry; `maxNumCores` is validated against it.
    pub const MAX_CORES: usize = 64;

    /// Wakeup-word sentinel: slot is free or its thread has exited.
    pub const UNOCCUPIED: u64 = u64::MAX;

    /// Wakeup-word sentinel: thread is running or waiting for a signal.
    /// Compares larger than any realistic cycle count, so sentinel slots
    /// fall out of the dispatcher's deadline comparison without a branch.
    pub const BLOCKED: u64 = u64::MAX - 1;

    /// Guard word written at the bottom of every uthread stack.
    pub const STACK_CANARY: u64 = 0x57EF_7CAB_F00D_FEED;

    /// `core_id` of a context not attached to any core (elasticity
    /// handoff, test setup).
    pub const CORE_ID_NONE: u8 = 0xFF;

    /// Default per-uthread stack size in bytes.
    pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

    /// Cache line size for alignment.
    pub const CACHE_LINE_SIZE: usize = 64;
}
