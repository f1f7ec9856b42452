//! Thread-local state of a kernel dispatch thread
//!
//! Each kernel thread knows which core it hosts, which context is
//! currently loaded on its CPU, and its private share of the priority
//! mask (drained from the core's public mask so local scheduling
//! decisions stop ping-ponging that cache line).

use std::cell::Cell;
use std::ptr;

use crate::context::ThreadContext;

thread_local! {
    /// Core index this kernel thread hosts; usize::MAX off-runtime.
    static KERNEL_THREAD_ID: Cell<usize> = const { Cell::new(usize::MAX) };

    /// Context currently loaded on this CPU.
    static RUNNING: Cell<*const ThreadContext> = const { Cell::new(ptr::null()) };

    /// Private half of the two-stage priority mask drain.
    static PRIVATE_PRIORITY_MASK: Cell<u64> = const { Cell::new(0) };
}

#[inline]
pub fn set_kernel_thread_id(id: usize) {
    KERNEL_THREAD_ID.with(|cell| cell.set(id));
}

#[inline]
pub fn kernel_thread_id() -> usize {
    KERNEL_THREAD_ID.with(|cell| cell.get())
}

#[inline]
pub fn clear_kernel_thread_id() {
    KERNEL_THREAD_ID.with(|cell| cell.set(usize::MAX));
}

#[inline]
pub fn set_running(ctx: *const ThreadContext) {
    RUNNING.with(|cell| cell.set(ctx));
}

#[inline]
pub fn running() -> *const ThreadContext {
    RUNNING.with(|cell| cell.get())
}

#[inline]
pub fn clear_running() {
    RUNNING.with(|cell| cell.set(ptr::null()));
}

/// True when the caller is executing inside a uthread.
#[inline]
pub fn is_in_uthread() -> bool {
    !running().is_null()
}

#[inline]
pub fn private_mask() -> u64 {
    PRIVATE_PRIORITY_MASK.with(|cell| cell.get())
}

#[inline]
pub fn set_private_mask(mask: u64) {
    PRIVATE_PRIORITY_MASK.with(|cell| cell.set(mask));
}

/// Drop `bits` from the private mask (slot reuse must not inherit a boost).
#[inline]
pub fn clear_private_bits(bits: u64) {
    PRIVATE_PRIORITY_MASK.with(|cell| cell.set(cell.get() & !bits));
}
