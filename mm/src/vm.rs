//! Address-space facade: `page_alloc` / `page_insert` / `page_remove` /
//! `page_lookup`, plus environment page-directory lifecycle.
//!
//! This is the only surface the syscall layer touches for mapping user
//! memory. It is deliberately thin: all the hard work (table walking,
//! huge-page splitting, frame refcounting) lives in `paging::tables` and
//! `page_alloc`. What this module adds is the refcount discipline around
//! *mapping*, which those lower layers don't own:
//!
//! - `page_insert` takes a reference on the frame being mapped before it
//!   touches the page table, and only then lets the table-walk code drop
//!   the old mapping's reference. Remapping a page to itself (refcount 1)
//!   would otherwise free the frame between the unmap and the map.
//! - the kernel never resolves a `COW` fault itself. `page_insert` and
//!   `page_remove` preserve whatever software bits (`COW`, `SHARED`) the
//!   caller asks for; resolving them is entirely a userland concern.

use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use chronos_abi::addr::{PhysAddr, VirtAddr};
use chronos_abi::env::PteFlags;
use chronos_abi::error::{ChronosError, ChronosResult};

use crate::hhdm::PhysAddrHhdm;
use crate::kernel_heap::{kfree, kzalloc};
use crate::page_alloc::{
    ALLOC_FLAG_ZERO, alloc_page_frame, free_page_frame, page_frame_can_free, page_frame_inc_ref,
};
use crate::paging::{self, ProcessPageDir};
use crate::paging_defs::PageFlags;

/// Translate a `PteFlags` permission word (as accepted across the syscall
/// boundary) into the `PageFlags` the table-walk code understands.
fn to_page_flags(perm: PteFlags) -> PageFlags {
    let mut flags = PageFlags::empty();
    if perm.contains(PteFlags::WRITABLE) {
        flags |= PageFlags::WRITABLE;
    }
    if perm.contains(PteFlags::USER) {
        flags |= PageFlags::USER;
    }
    if perm.contains(PteFlags::COW) {
        flags |= PageFlags::COW;
    }
    if perm.contains(PteFlags::SHARED) {
        flags |= PageFlags::SHARED;
    }
    flags
}

fn from_page_flags(flags: PageFlags) -> PteFlags {
    let mut perm = PteFlags::PRESENT;
    if flags.contains(PageFlags::WRITABLE) {
        perm |= PteFlags::WRITABLE;
    }
    if flags.contains(PageFlags::USER) {
        perm |= PteFlags::USER;
    }
    if flags.contains(PageFlags::COW) {
        perm |= PteFlags::COW;
    }
    if flags.contains(PageFlags::SHARED) {
        perm |= PteFlags::SHARED;
    }
    perm
}

/// Tracks the page directory of the environment presently scheduled on
/// the (single) CPU, so that user-pointer validation can find the right
/// address space without threading it through every call site.
static CURRENT_DIR: AtomicPtr<ProcessPageDir> = AtomicPtr::new(ptr::null_mut());

pub fn init_vm() {
    // `init_paging()` has already run by the time `memory_init` calls us.
    CURRENT_DIR.store(paging::paging_get_kernel_directory(), Ordering::Release);
}

/// Load `dir` into CR3 and record it as the active environment's address
/// space. Called by the scheduler on every context switch.
pub fn switch_to(dir: *mut ProcessPageDir) -> ChronosResult<()> {
    if paging::switch_page_directory(dir) != 0 {
        return Err(ChronosError::Inval);
    }
    CURRENT_DIR.store(dir, Ordering::Release);
    Ok(())
}

/// The page directory of the environment currently running on the CPU.
pub fn current_dir() -> *mut ProcessPageDir {
    CURRENT_DIR.load(Ordering::Acquire)
}

/// Allocate a fresh, zeroed physical page and return it, without mapping
/// it anywhere. The returned frame carries one reference, owned by the
/// caller; map it with `page_insert` (which takes its own reference) or
/// release it with `page_free`.
pub fn page_alloc() -> ChronosResult<PhysAddr> {
    let phys = alloc_page_frame(ALLOC_FLAG_ZERO);
    if phys.is_null() {
        return Err(ChronosError::NoMem);
    }
    Ok(phys)
}

/// Drop the caller's reference on a frame obtained from `page_alloc` that
/// was never mapped (or has since been fully unmapped elsewhere).
pub fn page_free(paddr: PhysAddr) {
    if page_frame_can_free(paddr) != 0 {
        free_page_frame(paddr);
    }
}

/// Map physical page `paddr` at `vaddr` in `dir` with permission `perm`.
///
/// If `vaddr` is already mapped, the previous frame's reference is
/// dropped after the new frame's reference is taken, so remapping a page
/// onto itself never transiently reaches a zero refcount.
pub fn page_insert(
    dir: *mut ProcessPageDir,
    vaddr: VirtAddr,
    paddr: PhysAddr,
    perm: PteFlags,
) -> ChronosResult<()> {
    if dir.is_null() || paddr.is_null() {
        return Err(ChronosError::Inval);
    }
    if !vaddr.is_aligned(chronos_abi::PAGE_SIZE) || !paddr.is_aligned(chronos_abi::PAGE_SIZE) {
        return Err(ChronosError::Inval);
    }

    if page_frame_inc_ref(paddr) < 0 {
        return Err(ChronosError::Inval);
    }

    let flags = to_page_flags(perm) | PageFlags::PRESENT;
    let rc = paging::map_page_4kb_in_dir(dir, vaddr, paddr, flags.bits());
    if rc != 0 {
        // The mapping never happened; undo the reference we just took.
        if page_frame_can_free(paddr) != 0 {
            free_page_frame(paddr);
        }
        return Err(ChronosError::NoMem);
    }
    Ok(())
}

/// Unmap `vaddr` from `dir`, dropping the mapped frame's reference (and
/// freeing it if that was the last one). A no-op if nothing is mapped
/// there.
pub fn page_remove(dir: *mut ProcessPageDir, vaddr: VirtAddr) {
    if dir.is_null() {
        return;
    }
    let _ = paging::unmap_page_in_dir(dir, vaddr);
}

/// Map a run of physical frames, read-only and user-readable, at
/// consecutive pages starting at `base` in `dir`. Used to install the
/// environment-table mirror: every environment's directory maps the same
/// physical frames at the same VA, so there is exactly one copy of the
/// mirror in memory, not one per environment.
pub fn map_readonly_shared(
    dir: *mut ProcessPageDir,
    base: VirtAddr,
    frames: &[PhysAddr],
) -> ChronosResult<()> {
    for (i, &frame) in frames.iter().enumerate() {
        let va = VirtAddr::new(base.as_u64() + (i as u64) * chronos_abi::PAGE_SIZE);
        page_insert(
            dir,
            va,
            frame,
            PteFlags::PRESENT | PteFlags::USER | PteFlags::SHARED,
        )?;
    }
    Ok(())
}

/// Look up the physical frame and permission bits mapped at `vaddr` in
/// `dir`. Returns `None` if nothing is mapped there.
pub fn page_lookup(dir: *mut ProcessPageDir, vaddr: VirtAddr) -> Option<(PhysAddr, PteFlags)> {
    if dir.is_null() {
        return None;
    }
    let flags = paging::paging_get_pte_flags(dir, vaddr)?;
    let paddr = paging::virt_to_phys_in_dir(dir, vaddr);
    if paddr.is_null() {
        return None;
    }
    Some((paddr, from_page_flags(flags)))
}

/// Allocate a fresh page directory for a new environment: a zeroed PML4
/// seeded with the kernel's higher-half mappings (so kernel code and the
/// HHDM remain reachable after a context switch), plus bookkeeping.
///
/// The directory starts with no user-space mappings; the caller is
/// responsible for populating them (ELF segments, the initial stack, the
/// exception stack) via `page_insert`.
pub fn env_pgdir_create() -> ChronosResult<*mut ProcessPageDir> {
    let pml4_phys = alloc_page_frame(ALLOC_FLAG_ZERO);
    if pml4_phys.is_null() {
        return Err(ChronosError::NoMem);
    }
    let pml4 = pml4_phys.to_virt().as_mut_ptr::<paging::PageTable>();
    if pml4.is_null() {
        page_free(pml4_phys);
        return Err(ChronosError::NoMem);
    }
    paging::paging_copy_kernel_mappings(pml4);

    let dir = kzalloc(core::mem::size_of::<ProcessPageDir>()) as *mut ProcessPageDir;
    if dir.is_null() {
        page_free(pml4_phys);
        return Err(ChronosError::NoMem);
    }
    unsafe {
        ptr::write(
            dir,
            ProcessPageDir {
                pml4,
                pml4_phys,
                ref_count: 1,
                process_id: 0,
                next: ptr::null_mut(),
                kernel_mapping_gen: 0,
            },
        );
    }
    Ok(dir)
}

/// Tear down an environment's page directory: unmap and free every
/// user-space frame it still owns, free its PML4, then free the
/// directory's own bookkeeping storage.
///
/// # Safety
///
/// `dir` must not be the currently active directory (switch to the
/// kernel directory first) and must not be referenced again afterwards.
pub unsafe fn env_pgdir_destroy(dir: *mut ProcessPageDir) {
    if dir.is_null() {
        return;
    }
    paging::paging_free_user_space(dir);
    let pml4_phys = unsafe { (*dir).pml4_phys };
    if page_frame_can_free(pml4_phys) != 0 {
        free_page_frame(pml4_phys);
    }
    unsafe {
        ptr::drop_in_place(dir);
    }
    kfree(dir as *mut c_void);
}
