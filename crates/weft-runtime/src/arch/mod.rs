//! Architecture-specific context switching
//!
//! Naked-assembly save/restore of the callee-preserved integer register
//! set, swapping stack pointers between uthread stacks. Floating-point
//! and vector registers are deliberately not saved: callers must not rely
//! on them surviving a suspension point. This is the documented contract
//! that keeps a switch well under 100ns.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use x86_64::*;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use aarch64::*;
    } else {
        compile_error!("Unsupported architecture");
    }
}
