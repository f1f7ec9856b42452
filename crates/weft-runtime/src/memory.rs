//! Stack memory for uthread contexts
//!
//! Each core owns one contiguous block of 56 fixed-size stacks, mapped in
//! a single call. On Unix the block is an anonymous MAP_NORESERVE
//! mapping, so untouched stacks cost address space only. A mapping
//! failure is fatal: the runtime cannot operate without its stacks.

use weft_core::constants::MAX_THREADS_PER_CORE;
use weft_core::kerror;

/// One core's block of uthread stacks.
pub struct StackRegion {
    base: *mut u8,
    len: usize,
    stack_size: usize,
}

// Safety: the region is plain memory; slices of it are handed out per
// slot and serialized by the slot lifecycle.
unsafe impl Send for StackRegion {}
unsafe impl Sync for StackRegion {}

impl StackRegion {
    /// Map stacks for a full core. Aborts the process on failure.
    pub fn map(stack_size: usize) -> StackRegion {
        let len = MAX_THREADS_PER_CORE * stack_size;
        let base = alloc_region(len);
        if base.is_null() {
            kerror!("failed to map {} bytes of uthread stacks", len);
            std::process::abort();
        }
        StackRegion {
            base,
            len,
            stack_size,
        }
    }

    /// Lowest address of slot `k`'s stack.
    #[inline]
    pub fn stack_bottom(&self, k: usize) -> *mut u8 {
        debug_assert!(k < MAX_THREADS_PER_CORE);
        unsafe { self.base.add(k * self.stack_size) }
    }

    /// One-past-the-end address of slot `k`'s stack.
    #[inline]
    pub fn stack_top(&self, k: usize) -> *mut u8 {
        unsafe { self.stack_bottom(k).add(self.stack_size) }
    }

    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }
}

impl Drop for StackRegion {
    fn drop(&mut self) {
        free_region(self.base, self.len);
    }
}

#[cfg(unix)]
fn alloc_region(len: usize) -> *mut u8 {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        std::ptr::null_mut()
    } else {
        ptr as *mut u8
    }
}

#[cfg(unix)]
fn free_region(base: *mut u8, len: usize) {
    unsafe {
        libc::munmap(base as *mut libc::c_void, len);
    }
}

#[cfg(not(unix))]
fn alloc_region(len: usize) -> *mut u8 {
    let layout = std::alloc::Layout::from_size_align(len, 4096).expect("stack region layout");
    unsafe { std::alloc::alloc_zeroed(layout) }
}

#[cfg(not(unix))]
fn free_region(base: *mut u8, len: usize) {
    let layout = std::alloc::Layout::from_size_align(len, 4096).expect("stack region layout");
    unsafe { std::alloc::dealloc(base, layout) }
}
