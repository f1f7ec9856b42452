//! aarch64 context switching
//!
//! AAPCS64: the callee-preserved integer registers are x19-x28 plus the
//! frame pointer x29 and link register x30. The seeded frame leaves x29
//! zero (end of backtrace) and places the entry address in the x30 slot,
//! so the trailing `ret` of a restore branches into the entry function.

use core::ptr;
use std::arch::naked_asm;

/// Bytes `swap` reserves for the callee-saved area: x19-x28, x29, x30.
/// Must stay in sync with the assembly bodies below.
pub const SAVED_REGISTER_BYTES: usize = 12 * 8;

/// Distance from the aligned stack top to a freshly seeded stack pointer.
/// sp must stay 16-byte aligned at all times on aarch64.
pub const SEED_FRAME_BYTES: usize = SAVED_REGISTER_BYTES;

const _: () = assert!(SEED_FRAME_BYTES % 16 == 0);

const X30_SLOT: usize = 88;

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
        "sub sp, sp, #96",
        "stp x19, x20, [sp, #0]",
        "stp x21, x22, [sp, #16]",
        "stp x23, x24, [sp, #32]",
        "stp x25, x26, [sp, #48]",
        "stp x27, x28, [sp, #64]",
        "stp x29, x30, [sp, #80]",
        "mov x2, sp",
        "str x2, [x0]",
        "ldr x2, [x1]",
        "mov sp, x2",
        "ldp x19, x20, [sp, #0]",
        "ldp x21, x22, [sp, #16]",
        "ldp x23, x24, [sp, #32]",
        "ldp x25, x26, [sp, #48]",
        "ldp x27, x28, [sp, #64]",
        "ldp x29, x30, [sp, #80]",
        "add sp, sp, #96",
        "ret",
    );
}

/// Load-only half of [`swap`]: discard the current context and resume
/// `*load_from`. Used by the shutdown and drain tear-down.
///
/// # Safety
///
/// Same as [`swap`] for `*load_from`.
#[unsafe(naked)]
pub unsafe extern "C" fn restore(_load_from: *const *mut u8) -> ! {
    naked_asm!(
        "ldr x2, [x0]",
        "mov sp, x2",
        "ldp x19, x20, [sp, #0]",
        "ldp x21, x22, [sp, #16]",
        "ldp x23, x24, [sp, #32]",
        "ldp x25, x26, [sp, #48]",
        "ldp x27, x28, [sp, #64]",
        "ldp x29, x30, [sp, #80]",
        "add sp, sp, #96",
        "ret",
    );
}

/// Build the initial frame on a fresh stack: zeroed register slots with
/// `entry` in the x30 position, so the first restore branches into it.
///
/// # Safety
///
/// `stack_top` must be the one-past-the-end address of a writable region
/// of at least `SEED_FRAME_BYTES` bytes.
pub unsafe fn seed_stack(stack_top: *mut u8, entry: usize) -> *mut u8 {
    let top = (stack_top as usize) & !0xF;
    let seed = (top - SEED_FRAME_BYTES) as *mut u8;
    ptr::write_bytes(seed, 0, SEED_FRAME_BYTES);
    *(seed.add(X30_SLOT) as *mut u64) = entry as u64;
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_frame_layout() {
        let mut stack = vec![0xAAu8; 4096];
        let top = unsafe { stack.as_mut_ptr().add(4096) };
        let entry = 0xDEAD_BEEFusize;

        let sp = unsafe { seed_stack(top, entry) };
        assert_eq!(sp as usize % 16, 0);

        let lr = unsafe { *(sp.add(X30_SLOT) as *const u64) };
        assert_eq!(lr, entry as u64);
        // Frame pointer slot stays zero: the seeded frame ends backtraces.
        let fp = unsafe { *(sp.add(80) as *const u64) };
        assert_eq!(fp, 0);
    }
}
