//! C-ABI-shaped syscall wrappers backing `libc::ffi`'s `extern "C"`
//! exports: process teardown and the bump-heap `brk`/`sbrk` pair.
//!
//! Chronos has no POSIX file descriptors — a process that wants file
//! access goes through `crate::fsclient`'s IPC wire protocol instead — so
//! unlike the teacher's own `libc::syscall` (which forwards `read`/
//! `write`/`open`/`close` to `crate::syscall::fs`), this module only
//! carries what the memory and exit surface actually needs.

use core::ffi::c_void;
use core::sync::atomic::{AtomicUsize, Ordering};

use chronos_abi::env::PteFlags;

use crate::syscall;

/// Base VA for this process's bump heap: above `fork::FORK_SCAN_TOP` so a
/// forked child's copy-on-write scan never has to look at it.
const HEAP_BASE: usize = 0x0400_0000;
const HEAP_LIMIT: usize = 0x0800_0000;

static HEAP_BRK: AtomicUsize = AtomicUsize::new(0);

fn heap_brk() -> usize {
    let cur = HEAP_BRK.load(Ordering::Relaxed);
    if cur == 0 {
        HEAP_BRK.store(HEAP_BASE, Ordering::Relaxed);
        HEAP_BASE
    } else {
        cur
    }
}

fn page_align_up(v: usize) -> usize {
    let page_size = chronos_abi::PAGE_SIZE as usize;
    (v + page_size - 1) & !(page_size - 1)
}

fn page_align_down(v: usize) -> usize {
    let page_size = chronos_abi::PAGE_SIZE as usize;
    v & !(page_size - 1)
}

/// POSIX-style exit: tears this environment down and never returns. There
/// is no parent-visible exit-status field in this ABI, so `status` only
/// matters insofar as the caller already reported it (e.g. via `cputs`)
/// before calling this.
pub fn sys_exit(_status: i32) -> ! {
    let _ = syscall::env_destroy(0);
    loop {
        syscall::sys_yield();
    }
}

/// POSIX-style `brk`: `addr` null reads the current break; otherwise maps
/// or unmaps whole pages to move the break to `addr`, rounded to the
/// containing page. Returns the (possibly rounded) new break, or the old
/// one unchanged if growth fails partway.
pub fn sys_brk(addr: *mut c_void) -> *mut c_void {
    let current = heap_brk();
    let requested = addr as usize;
    if requested == 0 || requested == current {
        return current as *mut c_void;
    }
    if requested < HEAP_BASE || requested > HEAP_LIMIT {
        return current as *mut c_void;
    }

    if requested > current {
        let mut page = page_align_up(current);
        let target = page_align_up(requested);
        while page < target {
            if syscall::page_alloc(0, page, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER).is_err() {
                return current as *mut c_void;
            }
            page += chronos_abi::PAGE_SIZE as usize;
        }
    } else {
        let mut page = page_align_down(current);
        let target = page_align_up(requested);
        while page > target {
            page -= chronos_abi::PAGE_SIZE as usize;
            let _ = syscall::page_unmap(0, page);
        }
    }

    HEAP_BRK.store(requested, Ordering::Relaxed);
    requested as *mut c_void
}

/// POSIX-style `sbrk`: extends/shrinks the break by `increment` bytes,
/// returning its previous value, or `-1` (as `usize::MAX`) on failure.
pub fn sys_sbrk(increment: isize) -> *mut c_void {
    let current = heap_brk();
    let target = if increment >= 0 {
        current.saturating_add(increment as usize)
    } else {
        current.saturating_sub((-increment) as usize)
    };
    let new_brk = sys_brk(target as *mut c_void);
    if new_brk as usize != target {
        return usize::MAX as *mut c_void;
    }
    current as *mut c_void
}
