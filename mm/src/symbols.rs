//! Kernel image bounds, provided by the linker script.
//!
//! The boot trampoline (an external seam, see `spec.md` non-goals) places
//! `__kernel_start`/`__kernel_end` symbols at the first and one-past-last
//! byte of the kernel image; `kernel_bounds` exposes them as a `(start,
//! end)` pointer pair for `memory_layout`'s kernel-reservation bookkeeping.

use core::ffi::c_void;

unsafe extern "C" {
    static __kernel_start: u8;
    static __kernel_end: u8;
}

/// Returns `(start, end)` physical bounds of the linked kernel image.
pub fn kernel_bounds() -> (*const c_void, *const c_void) {
    unsafe {
        (
            (&__kernel_start as *const u8).cast(),
            (&__kernel_end as *const u8).cast(),
        )
    }
}
