//! User-space copy-on-write `fork`, built entirely on the raw memory,
//! environment, and IPC primitives in `crate::syscall` (spec.md §4.4) — the
//! kernel never duplicates an address space itself.
//!
//! No teacher counterpart exists (the teacher's own fork-like primitive, if
//! any, is kernel-assisted); this is grounded directly on spec.md §4.4's
//! algorithm and the teacher's thin-wrapper style for the syscalls it
//! drives. `pgfault_trampoline.s` mirrors `core/context_switch.s`'s
//! TrapFrame-restore convention for the one piece of this (the upcall
//! entry/resume) that has to be assembly.

use core::arch::global_asm;
use core::ffi::c_void;

use chronos_abi::env::{EnvId, EnvStatus, PteFlags, UTrapframe};
use chronos_abi::error::ChronosResult;
use chronos_abi::{PAGE_SIZE, PFTEMP, UXSTACKTOP, USER_TOP};
use chronos_lib::InitFlag;

use crate::runtime::u_memcpy;
use crate::syscall;

global_asm!(include_str!("../pgfault_trampoline.s"));

unsafe extern "C" {
    fn pgfault_upcall();
}

/// Upper bound of the VA range `fork` scans for mapped pages. There is no
/// ELF loader or heap-size tracking in this workspace (both are external
/// collaborators per spec.md's non-goals), so this stands in for "however
/// far this process's image, heap, and stack actually reach" — generous
/// enough for every test and demo program here, far short of the
/// unusable alternative of probing all the way to `USER_TOP`.
const FORK_SCAN_TOP: u64 = 0x0200_0000;

static FORK_INIT: InitFlag = InitFlag::new();

/// Write-fault error-code bit (matches the hardware page-fault error code
/// this ABI's `UTrapframe::err` carries through unchanged: bit 1 set means
/// the faulting access was a write).
const PF_WRITE: u64 = 1 << 1;

/// Resolves a user fault: copies a private page over a COW mapping and
/// resumes, or terminates the environment if the fault isn't a supported
/// COW write. Called by `pgfault_upcall` with the kernel-constructed
/// `UTrapframe` on the exception stack.
#[unsafe(no_mangle)]
extern "C" fn pgfault_handler(utf: *mut UTrapframe) {
    // SAFETY: `utf` points at the UTrapframe the kernel just built on our
    // exception stack; the trampoline guarantees it is valid for the
    // duration of this call.
    let utf = unsafe { &*utf };
    let fault_va = utf.fault_va as usize;
    let page_va = fault_va & !((PAGE_SIZE as usize) - 1);

    let is_write = utf.err & PF_WRITE != 0;
    let perm = syscall::page_lookup(0, page_va).unwrap_or(PteFlags::empty());
    let resolvable = is_write && perm.contains(PteFlags::COW) && !perm.contains(PteFlags::WRITABLE);

    if !resolvable {
        // Not a fault this handler understands; nothing sane to resume
        // into. Tear the environment down rather than loop faulting.
        let _ = syscall::env_destroy(0);
        loop {
            syscall::sys_yield();
        }
    }

    let copy_page = || -> ChronosResult<()> {
        syscall::page_alloc(0, PFTEMP as usize, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER)?;
        unsafe {
            u_memcpy(
                PFTEMP as *mut c_void,
                page_va as *const c_void,
                PAGE_SIZE as usize,
            );
        }
        syscall::page_map(
            0,
            PFTEMP as usize,
            0,
            page_va,
            PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER,
        )?;
        syscall::page_unmap(0, PFTEMP as usize)?;
        Ok(())
    };

    if copy_page().is_err() {
        let _ = syscall::env_destroy(0);
        loop {
            syscall::sys_yield();
        }
    }
}

/// Allocates the calling environment's exception stack and registers
/// `pgfault_upcall`, if this hasn't already happened for this process.
/// Idempotent; `fork` calls this itself, so most callers never need to.
pub fn init_fork() -> ChronosResult<()> {
    if !FORK_INIT.init_once() {
        return Ok(());
    }
    syscall::page_alloc(
        0,
        (UXSTACKTOP - PAGE_SIZE) as usize,
        PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER,
    )?;
    syscall::env_set_pgfault_upcall(0, pgfault_upcall as usize)?;
    Ok(())
}

/// Classify one page's permission bits per spec.md §4.4 step 2's three
/// cases, independent of which environment is being remapped into.
fn remap_perm(perm: PteFlags) -> PteFlags {
    if perm.contains(PteFlags::SHARED) {
        perm
    } else if perm.contains(PteFlags::WRITABLE) || perm.contains(PteFlags::COW) {
        (perm - PteFlags::WRITABLE) | PteFlags::COW
    } else {
        perm
    }
}

/// Copy-on-write `fork`: duplicates the caller's address space into a new,
/// paused child by remapping (never copying) every page below
/// `FORK_SCAN_TOP`, then starts the child running. Returns the child's
/// envid to the parent; the child observes 0 (enforced by the kernel's
/// `exofork`).
pub fn fork() -> ChronosResult<EnvId> {
    init_fork()?;

    let child = syscall::exofork()?;

    let uxstack_va = (UXSTACKTOP - PAGE_SIZE) as usize;
    let mut va = 0usize;
    while (va as u64) < FORK_SCAN_TOP {
        if va == uxstack_va {
            va += PAGE_SIZE as usize;
            continue;
        }
        match syscall::page_lookup(0, va) {
            Ok(perm) => {
                let new_perm = remap_perm(perm);
                syscall::page_map(0, va, child, va, new_perm)?;
                if new_perm != perm {
                    // Re-mark the parent's own mapping COW too, per
                    // spec.md's "why both parent and child are re-marked"
                    // note: leaving the parent writable would let it
                    // mutate data the child still expects unchanged.
                    syscall::page_map(0, va, 0, va, new_perm)?;
                }
            }
            Err(_) => {}
        }
        va += PAGE_SIZE as usize;
    }

    syscall::page_alloc(
        child,
        uxstack_va,
        PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER,
    )?;
    syscall::env_set_pgfault_upcall(child, pgfault_upcall as usize)?;
    syscall::env_set_status(child, EnvStatus::Runnable as u32)?;

    Ok(child)
}

const _: () = assert!(USER_TOP > FORK_SCAN_TOP);
