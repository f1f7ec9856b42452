//! x86_64 context switching
//!
//! System V AMD64: the callee-preserved integer registers are rbp, rbx and
//! r12-r15. `swap` pushes them on the current stack, publishes the
//! resulting stack pointer, loads the target's, pops and returns on the
//! target stack. Being an opaque extern "C" call, it is also the compiler
//! barrier the switch needs.

use core::ptr;
use std::arch::naked_asm;

/// Bytes `swap` pushes for the callee-saved area: rbp, rbx, r12-r15.
/// Must stay in sync with the assembly bodies below.
pub const SAVED_REGISTER_BYTES: usize = 6 * 8;

/// Distance from the aligned stack top to a freshly seeded stack pointer:
/// the register area plus the return-address slot, padded so the seeded
/// sp stays 16-byte aligned.
pub const SEED_FRAME_BYTES: usize = 64;

const _: () = assert!(SEED_FRAME_BYTES >= SAVED_REGISTER_BYTES + 8);
const _: () = assert!(SEED_FRAME_BYTES % 16 == 0);

/// Save the current context into `*save_into` and resume `*load_from`.
///
/// Returns only when another invocation on the same CPU is made with
/// `load_from == save_into`. All caller locals must be assumed clobbered.
///
/// # Safety
///
/// `*load_from` must be a stack pointer produced by `swap` or
/// [`seed_stack`], on a live stack.
#[unsafe(naked)]
pub unsafe extern "C" fn swap(_save_into: *mut *mut u8, _load_from: *const *mut u8) {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, [rsi]",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    );
}

/// Load-only half of [`swap`]: discard the current context and resume
/// `*load_from`. Used by the shutdown and drain tear-down, where the
/// abandoned uthread context is dead.
///
/// # Safety
///
/// Same as [`swap`] for `*load_from`.
#[unsafe(naked)]
pub unsafe extern "C" fn restore(_load_from: *const *mut u8) -> ! {
    naked_asm!(
        "mov rsp, [rdi]",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    );
}

/// Build the initial frame on a fresh stack: a zero-filled register-save
/// area below a return-address slot holding `entry`, so the first restore
/// of the returned stack pointer enters `entry` cleanly.
///
/// The seeded sp is 16-byte aligned; after the pops and the `ret`, rsp is
/// congruent to 8 mod 16 at `entry`, as the ABI expects at function entry.
///
/// # Safety
///
/// `stack_top` must be the one-past-the-end address of a writable region
/// of at least `SEED_FRAME_BYTES` bytes.
pub unsafe fn seed_stack(stack_top: *mut u8, entry: usize) -> *mut u8 {
    let top = (stack_top as usize) & !0xF;
    let seed = (top - SEED_FRAME_BYTES) as *mut u8;
    ptr::write_bytes(seed, 0, SEED_FRAME_BYTES);
    *(seed.add(SAVED_REGISTER_BYTES) as *mut u64) = entry as u64;
    seed
}
