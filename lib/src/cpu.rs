//! The small sliver of CPU control this kernel needs: flag save/restore
//! around [`crate::spinlock::IrqMutex`] critical sections, `hlt`, and a
//! cycle counter for the test harness. GDT/IDT setup and the syscall/
//! page-fault trampoline are external seams (`spec.md` non-goals) and have
//! no representation here.

use core::arch::asm;

/// Disable interrupts, returning the previous RFLAGS so it can be restored
/// by [`restore_flags`].
#[inline(always)]
pub fn save_flags_cli() -> u64 {
    let flags: u64;
    unsafe {
        asm!("pushfq", "pop {}", "cli", out(reg) flags, options(nomem));
    }
    flags
}

/// Restore a previously saved RFLAGS, re-enabling interrupts only if they
/// were enabled when it was captured.
#[inline(always)]
pub fn restore_flags(flags: u64) {
    if flags & (1 << 9) != 0 {
        unsafe { asm!("sti", options(nomem, nostack)) };
    }
}

/// Halt until the next interrupt. Used by the scheduler when no
/// environment is runnable (`spec.md` §4.2).
#[inline(always)]
pub fn halt() {
    unsafe { asm!("hlt", options(nomem, nostack)) };
}

/// Read the timestamp counter, used only by the test harness to report
/// elapsed wall time for a suite run.
#[inline(always)]
pub fn rdtsc() -> u64 {
    let lo: u32;
    let hi: u32;
    unsafe {
        asm!("rdtsc", out("eax") lo, out("edx") hi, options(nomem, nostack, preserves_flags));
    }
    ((hi as u64) << 32) | (lo as u64)
}
