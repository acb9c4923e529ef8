extern crate alloc;

use core::ffi::c_void;
use core::mem::MaybeUninit;
use core::ptr;

use alloc::vec::Vec;

use chronos_abi::addr::{PhysAddr, VirtAddr};
use chronos_abi::env::PteFlags;
use chronos_lib::testing::TestResult;
use chronos_lib::{assert_not_null, assert_test, fail, klog_info, pass};

use crate::hhdm::PhysAddrHhdm;
use crate::kernel_heap::{get_heap_stats, kfree, kmalloc, kzalloc};
use crate::page_alloc::{
    ALLOC_FLAG_ZERO, alloc_page_frame, alloc_page_frames, free_page_frame,
    get_page_allocator_stats, page_frame_get_ref, page_frame_inc_ref,
};
use crate::paging::{paging_get_kernel_directory, paging_is_user_accessible, virt_to_phys};

// ============================================================================
// PAGE ALLOCATOR (BUDDY) TESTS - 8 tests
// ============================================================================

/// Test 1: Allocate and free a single 4KB page
pub fn test_page_alloc_single() -> TestResult {
    let phys = alloc_page_frame(0);
    assert_not_null!(phys.as_u64() as *const u8, "allocate single page");
    assert_test!(phys.as_u64() != 0, "allocated address is zero");

    let ref_count = page_frame_get_ref(phys);
    if ref_count == 0 {
        free_page_frame(phys);
        return fail!(
            "ref count should be non-zero after alloc, got {}",
            ref_count
        );
    }

    free_page_frame(phys);
    pass!()
}

/// Test 2: Allocate multi-order blocks (2, 4, 8 pages)
pub fn test_page_alloc_multi_order() -> TestResult {
    let phys2 = alloc_page_frames(2, 0);
    assert_not_null!(phys2.as_u64() as *const u8, "allocate 2 pages");

    let phys4 = alloc_page_frames(4, 0);
    if phys4.is_null() {
        free_page_frame(phys2);
        return fail!("allocate 4 pages");
    }

    let phys8 = alloc_page_frames(8, 0);
    if phys8.is_null() {
        free_page_frame(phys2);
        free_page_frame(phys4);
        return fail!("allocate 8 pages");
    }

    free_page_frame(phys2);
    free_page_frame(phys4);
    free_page_frame(phys8);
    pass!()
}

/// Test 3: Alloc→free→alloc same size, verify it still succeeds (coalescing)
pub fn test_page_alloc_free_cycle() -> TestResult {
    let phys1 = alloc_page_frame(0);
    assert_not_null!(phys1.as_u64() as *const u8, "first alloc");

    free_page_frame(phys1);

    let phys2 = alloc_page_frame(0);
    assert_not_null!(phys2.as_u64() as *const u8, "second alloc after free");

    free_page_frame(phys2);
    pass!()
}

/// Test 4: Allocate with ALLOC_FLAG_ZERO, verify memory is zeroed
pub fn test_page_alloc_zeroed() -> TestResult {
    let phys = alloc_page_frame(ALLOC_FLAG_ZERO);
    assert_not_null!(phys.as_u64() as *const u8, "allocate zeroed page");

    if let Some(virt) = phys.to_virt_checked() {
        let ptr: *const u8 = virt.as_ptr();
        for i in 0..64 {
            let byte = unsafe { *ptr.add(i) };
            if byte != 0 {
                free_page_frame(phys);
                return fail!("zeroed page has non-zero byte at offset {}", i);
            }
        }
    }

    free_page_frame(phys);
    pass!()
}

/// Test 5: Reference count increment and decrement
pub fn test_page_alloc_refcount() -> TestResult {
    let phys = alloc_page_frame(0);
    assert_not_null!(phys.as_u64() as *const u8, "alloc for refcount test");

    let ref1 = page_frame_get_ref(phys);
    if ref1 != 1 {
        free_page_frame(phys);
        return fail!("initial refcount should be 1, got {}", ref1);
    }

    let new_ref = page_frame_inc_ref(phys);
    if new_ref != 2 {
        free_page_frame(phys);
        free_page_frame(phys);
        return fail!("refcount after inc should be 2, got {}", new_ref);
    }

    // First free should just decrement
    free_page_frame(phys);

    let ref_after = page_frame_get_ref(phys);
    if ref_after != 1 {
        free_page_frame(phys);
        return fail!("refcount after first free should be 1, got {}", ref_after);
    }

    // Second free should actually free
    free_page_frame(phys);
    pass!()
}

/// Test 6: Stats accuracy check
pub fn test_page_alloc_stats() -> TestResult {
    let mut total = 0u32;
    let mut free_before = 0u32;
    let mut alloc_before = 0u32;
    get_page_allocator_stats(&mut total, &mut free_before, &mut alloc_before);

    assert_test!(total != 0, "total frames is 0");

    let phys = alloc_page_frames(4, 0);
    assert_not_null!(phys.as_u64() as *const u8, "alloc 4 pages for stats");

    let mut free_after = 0u32;
    let mut alloc_after = 0u32;
    get_page_allocator_stats(ptr::null_mut(), &mut free_after, &mut alloc_after);

    if alloc_after < alloc_before + 4 {
        free_page_frame(phys);
        return fail!("allocated count didn't increase by 4");
    }

    free_page_frame(phys);
    pass!()
}

/// Test 7: Free NULL address should not crash
pub fn test_page_alloc_free_null() -> TestResult {
    let _result = free_page_frame(PhysAddr::NULL);
    pass!()
}

/// Test 8: Fragmentation stress test
pub fn test_page_alloc_fragmentation() -> TestResult {
    let mut pages: [PhysAddr; 8] = [PhysAddr::NULL; 8];
    for i in 0..8 {
        pages[i] = alloc_page_frame(0);
        if pages[i].is_null() {
            for j in 0..i {
                free_page_frame(pages[j]);
            }
            return fail!("failed to allocate page {}", i);
        }
    }

    free_page_frame(pages[0]);
    free_page_frame(pages[2]);
    free_page_frame(pages[4]);
    free_page_frame(pages[6]);

    let large = alloc_page_frames(2, 0);
    if !large.is_null() {
        free_page_frame(large);
    }

    free_page_frame(pages[1]);
    free_page_frame(pages[3]);
    free_page_frame(pages[5]);
    free_page_frame(pages[7]);
    pass!()
}

// ============================================================================
// KERNEL HEAP TESTS
// ============================================================================

pub fn test_heap_small_alloc() -> TestResult {
    let p16 = kmalloc(16);
    assert_not_null!(p16, "allocate 16 bytes");

    let p32 = kmalloc(32);
    if p32.is_null() {
        kfree(p16);
        return fail!("allocate 32 bytes");
    }

    let p64 = kmalloc(64);
    if p64.is_null() {
        kfree(p16);
        kfree(p32);
        return fail!("allocate 64 bytes");
    }

    kfree(p64);
    kfree(p32);
    kfree(p16);
    pass!()
}

pub fn test_heap_medium_alloc() -> TestResult {
    let p256 = kmalloc(256);
    assert_not_null!(p256, "allocate 256 bytes");

    let p512 = kmalloc(512);
    if p512.is_null() {
        kfree(p256);
        return fail!("allocate 512 bytes");
    }

    let p1k = kmalloc(1024);
    if p1k.is_null() {
        kfree(p256);
        kfree(p512);
        return fail!("allocate 1024 bytes");
    }

    kfree(p1k);
    kfree(p512);
    kfree(p256);
    pass!()
}

pub fn test_heap_large_alloc() -> TestResult {
    let p4k = kmalloc(4096);
    assert_not_null!(p4k, "allocate 4KB");

    let p16k = kmalloc(16384);
    if p16k.is_null() {
        kfree(p4k);
        return fail!("allocate 16KB");
    }

    kfree(p16k);
    kfree(p4k);
    pass!()
}

pub fn test_heap_kzalloc_zeroed() -> TestResult {
    let ptr = kzalloc(128);
    assert_not_null!(ptr, "kzalloc 128 bytes");

    let bytes = ptr as *const u8;
    for i in 0..128 {
        let b = unsafe { *bytes.add(i) };
        if b != 0 {
            kfree(ptr);
            return fail!("kzalloc memory not zeroed at offset {}", i);
        }
    }

    kfree(ptr);
    pass!()
}

pub fn test_heap_kfree_null() -> TestResult {
    kfree(ptr::null_mut());
    pass!()
}

pub fn test_heap_alloc_zero() -> TestResult {
    let ptr = kmalloc(0);
    if !ptr.is_null() {
        kfree(ptr);
        return fail!("kmalloc(0) should return null");
    }
    pass!()
}

pub fn test_heap_stats() -> TestResult {
    let mut stats_before = MaybeUninit::uninit();
    get_heap_stats(stats_before.as_mut_ptr());
    let before = unsafe { stats_before.assume_init() };

    let ptr = kmalloc(256);
    assert_not_null!(ptr, "alloc for stats test");

    let mut stats_after = MaybeUninit::uninit();
    get_heap_stats(stats_after.as_mut_ptr());
    let after = unsafe { stats_after.assume_init() };

    if after.allocated_size <= before.allocated_size {
        kfree(ptr);
        return fail!("allocated size didn't increase");
    }

    if after.allocation_count <= before.allocation_count {
        kfree(ptr);
        return fail!("allocation count didn't increase");
    }

    kfree(ptr);
    pass!()
}

pub fn test_global_alloc_vec() -> TestResult {
    let mut vec = Vec::new();
    for i in 0..128u64 {
        vec.push(i);
    }
    assert_test!(vec.len() == 128, "vec length should be 128");
    pass!()
}

pub fn test_heap_free_list_search() -> TestResult {
    let mut stats_before = MaybeUninit::uninit();
    get_heap_stats(stats_before.as_mut_ptr());
    let initial_heap_size = unsafe { stats_before.assume_init() }.total_size;

    let p1 = kmalloc(256);
    assert_not_null!(p1, "alloc p1");
    let p2 = kmalloc(256);
    if p2.is_null() {
        kfree(p1);
        return fail!("alloc p2");
    }
    let p3 = kmalloc(256);
    if p3.is_null() {
        kfree(p1);
        kfree(p2);
        return fail!("alloc p3");
    }

    let mut stats_after_alloc = MaybeUninit::uninit();
    get_heap_stats(stats_after_alloc.as_mut_ptr());
    let heap_after_alloc = unsafe { stats_after_alloc.assume_init() }.total_size;

    kfree(p1);
    kfree(p2);

    let p4 = kmalloc(256);
    if p4.is_null() {
        kfree(p3);
        return fail!("alloc p4");
    }
    let p5 = kmalloc(256);
    if p5.is_null() {
        kfree(p3);
        kfree(p4);
        return fail!("alloc p5");
    }

    let mut stats_final = MaybeUninit::uninit();
    get_heap_stats(stats_final.as_mut_ptr());
    let final_heap_size = unsafe { stats_final.assume_init() }.total_size;

    if final_heap_size > heap_after_alloc {
        kfree(p3);
        kfree(p4);
        kfree(p5);
        return fail!("heap grew beyond post-alloc size");
    }

    kfree(p3);
    kfree(p4);
    kfree(p5);

    assert_test!(
        final_heap_size >= initial_heap_size,
        "final heap size less than initial"
    );
    pass!()
}

/// Regression test: Verify HEAP_WARMUP_PAGES is sufficient for soft reboot coherency.
///
/// After soft reboot, x86 paging structure caches may retain stale entries. The fix
/// requires >=2 physical frame allocations AND >=1 page mapping during heap init.
pub fn test_heap_warmup_pages_minimum() -> TestResult {
    use crate::kernel_heap::HEAP_WARMUP_PAGES;

    const MINIMUM_WARMUP_PAGES: u32 = 2;

    if HEAP_WARMUP_PAGES < MINIMUM_WARMUP_PAGES {
        return fail!(
            "HEAP_WARMUP_PAGES ({}) is below minimum ({})",
            HEAP_WARMUP_PAGES,
            MINIMUM_WARMUP_PAGES
        );
    }

    pass!()
}

pub fn test_heap_fragmentation_behind_head() -> TestResult {
    let mut ptrs: [*mut c_void; 5] = [ptr::null_mut(); 5];
    let sizes = [128usize, 256, 128, 512, 256];

    for (i, size) in sizes.iter().enumerate() {
        ptrs[i] = kmalloc(*size);
        if ptrs[i].is_null() {
            for j in 0..i {
                kfree(ptrs[j]);
            }
            return fail!("alloc {} bytes at index {}", size, i);
        }
    }

    kfree(ptrs[0]);
    kfree(ptrs[2]);
    kfree(ptrs[3]);

    let needed = kmalloc(400);
    if needed.is_null() {
        kfree(ptrs[1]);
        kfree(ptrs[4]);
        return fail!("alloc 400 bytes from freed gaps");
    }

    kfree(needed);
    kfree(ptrs[1]);
    kfree(ptrs[4]);
    pass!()
}

// ============================================================================
// PAGING TESTS
// ============================================================================

/// Test 1: virt_to_phys on kernel address
pub fn test_paging_virt_to_phys() -> TestResult {
    let kernel_addr = VirtAddr::new(test_paging_virt_to_phys as *const () as u64);
    let phys = virt_to_phys(kernel_addr);
    assert_test!(
        !phys.is_null(),
        "virt_to_phys returned null for kernel code"
    );
    pass!()
}

/// Test 2: Kernel directory retrieval, and that `vm::current_dir` tracks it
/// once `vm::init_vm` has run.
pub fn test_paging_get_kernel_dir() -> TestResult {
    let kernel_dir = paging_get_kernel_directory();
    assert_not_null!(kernel_dir, "kernel directory");

    let current_dir = crate::vm::current_dir();
    assert_not_null!(current_dir, "current directory");
    pass!()
}

/// Test 3: User accessible check on kernel page (should fail)
pub fn test_paging_user_accessible_kernel() -> TestResult {
    let kernel_dir = paging_get_kernel_directory();
    assert_not_null!(kernel_dir, "kernel directory");

    let kernel_addr = VirtAddr::new(test_paging_user_accessible_kernel as *const () as u64);
    let is_user = paging_is_user_accessible(kernel_dir, kernel_addr);
    assert_test!(
        is_user == 0,
        "kernel code incorrectly marked as user accessible"
    );
    pass!()
}

// ============================================================================
// VM FACADE TESTS (page_alloc / page_insert / page_remove / page_lookup,
// environment page-directory lifecycle)
// ============================================================================

use crate::vm;

const VM_TEST_VADDR: u64 = 0x4000_0000;

pub fn test_vm_env_pgdir_create_destroy() -> TestResult {
    let dir = match vm::env_pgdir_create() {
        Ok(d) => d,
        Err(e) => return fail!("env_pgdir_create failed: {:?}", e),
    };
    assert_not_null!(dir, "fresh env page directory");

    unsafe { vm::env_pgdir_destroy(dir) };
    pass!()
}

pub fn test_vm_insert_lookup_remove() -> TestResult {
    let dir = match vm::env_pgdir_create() {
        Ok(d) => d,
        Err(e) => return fail!("env_pgdir_create failed: {:?}", e),
    };

    let phys = match vm::page_alloc() {
        Ok(p) => p,
        Err(e) => {
            unsafe { vm::env_pgdir_destroy(dir) };
            return fail!("page_alloc failed: {:?}", e);
        }
    };

    let vaddr = VirtAddr::new(VM_TEST_VADDR);
    let perm = PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER;

    if let Err(e) = vm::page_insert(dir, vaddr, phys, perm) {
        vm::page_free(phys);
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("page_insert failed: {:?}", e);
    }

    let Some((looked_up_phys, looked_up_perm)) = vm::page_lookup(dir, vaddr) else {
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("page_lookup found nothing after page_insert");
    };

    if looked_up_phys != phys {
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!(
            "page_lookup returned wrong frame: {:?} != {:?}",
            looked_up_phys,
            phys
        );
    }
    if !looked_up_perm.contains(PteFlags::WRITABLE) {
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("page_lookup lost the WRITABLE permission bit");
    }

    vm::page_remove(dir, vaddr);
    if vm::page_lookup(dir, vaddr).is_some() {
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("page_lookup still found a mapping after page_remove");
    }

    unsafe { vm::env_pgdir_destroy(dir) };
    pass!()
}

/// Covers the `COW` software bit being syscall-legal and round-tripping
/// through `page_insert`/`page_lookup` untouched by the kernel.
pub fn test_vm_cow_bit_roundtrips() -> TestResult {
    let dir = match vm::env_pgdir_create() {
        Ok(d) => d,
        Err(e) => return fail!("env_pgdir_create failed: {:?}", e),
    };
    let phys = match vm::page_alloc() {
        Ok(p) => p,
        Err(e) => {
            unsafe { vm::env_pgdir_destroy(dir) };
            return fail!("page_alloc failed: {:?}", e);
        }
    };

    let vaddr = VirtAddr::new(VM_TEST_VADDR);
    let perm = PteFlags::PRESENT | PteFlags::USER | PteFlags::COW;

    if let Err(e) = vm::page_insert(dir, vaddr, phys, perm) {
        vm::page_free(phys);
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("page_insert with COW failed: {:?}", e);
    }

    let Some((_, looked_up_perm)) = vm::page_lookup(dir, vaddr) else {
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("page_lookup found nothing after COW page_insert");
    };

    if !looked_up_perm.contains(PteFlags::COW) {
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("COW bit did not survive page_insert/page_lookup");
    }
    if looked_up_perm.contains(PteFlags::WRITABLE) {
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("COW page was mapped WRITABLE, defeating the fault trap");
    }

    unsafe { vm::env_pgdir_destroy(dir) };
    pass!()
}

/// The refcount invariant this module exists to protect: remapping a
/// virtual address onto the *same* physical frame must never transiently
/// drop that frame's refcount to zero (which would free it out from under
/// the still-valid mapping).
pub fn test_vm_self_remap_preserves_refcount() -> TestResult {
    let dir = match vm::env_pgdir_create() {
        Ok(d) => d,
        Err(e) => return fail!("env_pgdir_create failed: {:?}", e),
    };
    let phys = match vm::page_alloc() {
        Ok(p) => p,
        Err(e) => {
            unsafe { vm::env_pgdir_destroy(dir) };
            return fail!("page_alloc failed: {:?}", e);
        }
    };

    let vaddr = VirtAddr::new(VM_TEST_VADDR);
    let perm = PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER;

    if let Err(e) = vm::page_insert(dir, vaddr, phys, perm) {
        vm::page_free(phys);
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("first page_insert failed: {:?}", e);
    }

    let ref_before = page_frame_get_ref(phys);

    // Remap the same vaddr to the same frame: the old mapping's reference
    // must be dropped only after the new one is taken.
    if let Err(e) = vm::page_insert(dir, vaddr, phys, perm) {
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("self-remap page_insert failed: {:?}", e);
    }

    let ref_after = page_frame_get_ref(phys);
    if ref_after != ref_before {
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!(
            "self-remap changed refcount: {} -> {} (frame may have been freed transiently)",
            ref_before,
            ref_after
        );
    }

    if vm::page_lookup(dir, vaddr).is_none() {
        unsafe { vm::env_pgdir_destroy(dir) };
        return fail!("mapping vanished after self-remap");
    }

    unsafe { vm::env_pgdir_destroy(dir) };
    pass!()
}

// ============================================================================
// RING BUFFER TESTS
// ============================================================================

pub fn test_ring_buffer_basic() -> TestResult {
    use chronos_lib::ring_buffer::RingBuffer;

    let mut rb: RingBuffer<u32, 8> = RingBuffer::new();
    assert_test!(rb.is_empty(), "new buffer should be empty");
    assert_test!(rb.try_push(42), "push to empty buffer failed");
    assert_test!(!rb.is_empty(), "buffer should not be empty after push");

    let val = rb.try_pop();
    assert_test!(val == Some(42), "pop returned wrong value");
    assert_test!(rb.is_empty(), "buffer should be empty after pop");
    pass!()
}

pub fn test_ring_buffer_fifo() -> TestResult {
    use chronos_lib::ring_buffer::RingBuffer;

    let mut rb: RingBuffer<u32, 8> = RingBuffer::new();
    rb.try_push(1);
    rb.try_push(2);
    rb.try_push(3);

    assert_test!(rb.try_pop() == Some(1), "FIFO order violated (expected 1)");
    assert_test!(rb.try_pop() == Some(2), "FIFO order violated (expected 2)");
    assert_test!(rb.try_pop() == Some(3), "FIFO order violated (expected 3)");
    pass!()
}

pub fn test_ring_buffer_empty_pop() -> TestResult {
    use chronos_lib::ring_buffer::RingBuffer;

    let mut rb: RingBuffer<u32, 8> = RingBuffer::new();
    assert_test!(rb.try_pop().is_none(), "pop from empty should return None");
    pass!()
}

pub fn test_ring_buffer_full() -> TestResult {
    use chronos_lib::ring_buffer::RingBuffer;

    let mut rb: RingBuffer<u32, 4> = RingBuffer::new();
    for i in 0..4 {
        if !rb.try_push(i) {
            return fail!("push {} failed unexpectedly", i);
        }
    }

    assert_test!(rb.is_full(), "buffer should be full");
    assert_test!(!rb.try_push(999), "push to full buffer should fail");
    pass!()
}

pub fn test_ring_buffer_overwrite() -> TestResult {
    use chronos_lib::ring_buffer::RingBuffer;

    let mut rb: RingBuffer<u32, 4> = RingBuffer::new();
    for i in 0..4u32 {
        rb.push_overwrite(i);
    }

    rb.push_overwrite(99);

    assert_test!(
        rb.try_pop() == Some(1),
        "overwrite test failed (expected 1)"
    );
    pass!()
}

pub fn test_ring_buffer_wrap() -> TestResult {
    use chronos_lib::ring_buffer::RingBuffer;

    let mut rb: RingBuffer<u32, 4> = RingBuffer::new();
    rb.try_push(1);
    rb.try_push(2);
    rb.try_push(3);

    rb.try_pop();
    rb.try_pop();

    rb.try_push(4);
    rb.try_push(5);
    rb.try_push(6);

    assert_test!(rb.try_pop() == Some(3), "wrap expected 3");
    assert_test!(rb.try_pop() == Some(4), "wrap expected 4");
    assert_test!(rb.try_pop() == Some(5), "wrap expected 5");
    assert_test!(rb.try_pop() == Some(6), "wrap expected 6");
    pass!()
}

pub fn test_ring_buffer_reset() -> TestResult {
    use chronos_lib::ring_buffer::RingBuffer;

    let mut rb: RingBuffer<u32, 8> = RingBuffer::new();
    rb.try_push(1);
    rb.try_push(2);
    rb.try_push(3);

    rb.reset();

    assert_test!(rb.is_empty(), "buffer should be empty after reset");
    assert_test!(rb.len() == 0, "length should be 0 after reset");
    pass!()
}

pub fn test_ring_buffer_capacity() -> TestResult {
    use chronos_lib::ring_buffer::RingBuffer;

    let rb: RingBuffer<u32, 16> = RingBuffer::new();
    assert_test!(rb.capacity() == 16, "capacity should be 16");
    pass!()
}

// ============================================================================
// IRQMUTEX TESTS
// ============================================================================

pub fn test_irqmutex_basic() -> TestResult {
    use chronos_lib::IrqMutex;

    let mutex: IrqMutex<u32> = IrqMutex::new(42);

    {
        let guard = mutex.lock();
        assert_test!(*guard == 42, "IrqMutex initial value wrong");
    }

    pass!()
}

pub fn test_irqmutex_mutation() -> TestResult {
    use chronos_lib::IrqMutex;

    let mutex: IrqMutex<u32> = IrqMutex::new(0);

    {
        let mut guard = mutex.lock();
        *guard = 100;
    }

    {
        let guard = mutex.lock();
        if *guard != 100 {
            return fail!("IrqMutex mutation failed, got {}", *guard);
        }
    }

    pass!()
}

pub fn test_irqmutex_try_lock() -> TestResult {
    use chronos_lib::IrqMutex;

    let mutex: IrqMutex<u32> = IrqMutex::new(55);

    {
        let maybe_guard = mutex.try_lock();
        assert_test!(
            maybe_guard.is_some(),
            "try_lock on unlocked mutex should succeed"
        );
        let guard = maybe_guard.unwrap();
        assert_test!(*guard == 55, "try_lock value should be 55");
    }

    pass!()
}

// ============================================================================
// RIGOROUS MEMORY TESTS - Actually verify memory contents
// ============================================================================

pub fn test_page_alloc_write_verify() -> TestResult {
    let phys = alloc_page_frame(ALLOC_FLAG_ZERO);
    assert_not_null!(phys.as_u64() as *const u8, "allocate page");

    let virt = match phys.to_virt_checked() {
        Some(v) => v,
        None => {
            free_page_frame(phys);
            return fail!("get virtual address");
        }
    };

    let ptr = virt.as_mut_ptr::<u8>();

    for i in 0..4096 {
        unsafe {
            let val = if i % 2 == 0 { 0xAA } else { 0x55 };
            ptr.add(i).write_volatile(val);
        }
    }

    for i in 0..4096 {
        let expected = if i % 2 == 0 { 0xAA } else { 0x55 };
        let actual = unsafe { ptr.add(i).read_volatile() };
        if actual != expected {
            free_page_frame(phys);
            return fail!(
                "memory corruption at offset {}: expected {:#x}, got {:#x}",
                i,
                expected,
                actual
            );
        }
    }

    free_page_frame(phys);
    pass!()
}

pub fn test_page_alloc_zero_full_page() -> TestResult {
    let phys = alloc_page_frame(ALLOC_FLAG_ZERO);
    assert_not_null!(phys.as_u64() as *const u8, "allocate zeroed page");

    let virt = match phys.to_virt_checked() {
        Some(v) => v,
        None => {
            free_page_frame(phys);
            return fail!("get virtual address");
        }
    };

    let ptr = virt.as_mut_ptr::<u8>();

    for i in 0..4096 {
        let val = unsafe { ptr.add(i).read_volatile() };
        if val != 0 {
            free_page_frame(phys);
            return fail!("zeroed page has non-zero at offset {}: {:#x}", i, val);
        }
    }

    free_page_frame(phys);
    pass!()
}

pub fn test_page_alloc_no_stale_data() -> TestResult {
    let phys1 = alloc_page_frame(0);
    assert_not_null!(phys1.as_u64() as *const u8, "first alloc");

    if let Some(virt) = phys1.to_virt_checked() {
        let ptr = virt.as_mut_ptr::<u8>();
        for i in 0..4096 {
            unsafe { ptr.add(i).write_volatile(0xDE) };
        }
    }

    free_page_frame(phys1);

    let phys2 = alloc_page_frame(ALLOC_FLAG_ZERO);
    assert_not_null!(phys2.as_u64() as *const u8, "second alloc with zero flag");

    if let Some(virt) = phys2.to_virt_checked() {
        let ptr = virt.as_mut_ptr::<u8>();
        for i in 0..256 {
            let val = unsafe { ptr.add(i).read_volatile() };
            if val != 0 {
                free_page_frame(phys2);
                return fail!("stale data found at offset {}: {:#x} (expected 0)", i, val);
            }
        }
    }

    free_page_frame(phys2);
    pass!()
}

pub fn test_heap_boundary_write() -> TestResult {
    let sizes = [16usize, 32, 64, 128, 256, 512, 1024];

    for &size in &sizes {
        let ptr = kmalloc(size);
        if ptr.is_null() {
            return fail!("allocate {} bytes", size);
        }

        let byte_ptr = ptr as *mut u8;

        for i in 0..size {
            unsafe { byte_ptr.add(i).write_volatile((i & 0xFF) as u8) };
        }

        for i in 0..size {
            let expected = (i & 0xFF) as u8;
            let actual = unsafe { byte_ptr.add(i).read_volatile() };
            if actual != expected {
                kfree(ptr);
                return fail!(
                    "heap corruption at size={} offset={}: expected {:#x}, got {:#x}",
                    size,
                    i,
                    expected,
                    actual
                );
            }
        }

        kfree(ptr);
    }

    pass!()
}

pub fn test_heap_no_overlap() -> TestResult {
    const NUM_ALLOCS: usize = 8;
    let mut ptrs: [*mut c_void; NUM_ALLOCS] = [ptr::null_mut(); NUM_ALLOCS];
    let sizes = [64usize, 128, 256, 64, 512, 128, 256, 64];

    for i in 0..NUM_ALLOCS {
        ptrs[i] = kmalloc(sizes[i]);
        if ptrs[i].is_null() {
            for j in 0..i {
                kfree(ptrs[j]);
            }
            return fail!("allocate block {}", i);
        }

        let byte_ptr = ptrs[i] as *mut u8;
        for j in 0..sizes[i] {
            unsafe { byte_ptr.add(j).write_volatile(i as u8) };
        }
    }

    for i in 0..NUM_ALLOCS {
        let byte_ptr = ptrs[i] as *mut u8;
        for j in 0..sizes[i] {
            let actual = unsafe { byte_ptr.add(j).read_volatile() };
            if actual != i as u8 {
                for k in 0..NUM_ALLOCS {
                    kfree(ptrs[k]);
                }
                return fail!(
                    "allocation {} corrupted at offset {}: expected {:#x}, got {:#x}",
                    i,
                    j,
                    i as u8,
                    actual
                );
            }
        }
    }

    for i in 0..NUM_ALLOCS {
        kfree(ptrs[i]);
    }
    pass!()
}

pub fn test_heap_double_free_defensive() -> TestResult {
    let ptr = kmalloc(64);
    assert_not_null!(ptr, "alloc 64 bytes");

    kfree(ptr);
    kfree(ptr);
    pass!()
}

pub fn test_heap_large_block_integrity() -> TestResult {
    let size = 8192usize;
    let ptr = kmalloc(size);
    assert_not_null!(ptr, "allocate 8KB");

    let byte_ptr = ptr as *mut u8;

    for i in 0..size {
        let pattern = ((i * 17) & 0xFF) as u8;
        unsafe { byte_ptr.add(i).write_volatile(pattern) };
    }

    for i in 0..size {
        let expected = ((i * 17) & 0xFF) as u8;
        let actual = unsafe { byte_ptr.add(i).read_volatile() };
        if actual != expected {
            kfree(ptr);
            return fail!(
                "large block corruption at offset {}: expected {:#x}, got {:#x}",
                i,
                expected,
                actual
            );
        }
    }

    kfree(ptr);
    pass!()
}

pub fn test_heap_stress_cycles() -> TestResult {
    for cycle in 0..100 {
        let ptr = kmalloc(128);
        if ptr.is_null() {
            return fail!("stress test failed at cycle {}", cycle);
        }

        let byte_ptr = ptr as *mut u8;
        unsafe {
            byte_ptr.write_volatile(0xAB);
            byte_ptr.add(127).write_volatile(0xCD);
        }

        let first = unsafe { byte_ptr.read_volatile() };
        let last = unsafe { byte_ptr.add(127).read_volatile() };

        if first != 0xAB || last != 0xCD {
            kfree(ptr);
            return fail!(
                "stress corruption at cycle {}: first={:#x}, last={:#x}",
                cycle,
                first,
                last
            );
        }

        kfree(ptr);
    }

    pass!()
}

pub fn test_page_alloc_multipage_integrity() -> TestResult {
    let phys = alloc_page_frames(4, ALLOC_FLAG_ZERO);
    assert_not_null!(phys.as_u64() as *const u8, "allocate 4 pages");

    for page in 0..4u64 {
        let page_phys = PhysAddr::new(phys.as_u64() + page * 4096);
        if let Some(virt) = page_phys.to_virt_checked() {
            let ptr = virt.as_mut_ptr::<u8>();
            for i in 0..4096 {
                let pattern = ((page as u8).wrapping_mul(17)).wrapping_add((i & 0xFF) as u8);
                unsafe { ptr.add(i).write_volatile(pattern) };
            }
        }
    }

    for page in 0..4u64 {
        let page_phys = PhysAddr::new(phys.as_u64() + page * 4096);
        if let Some(virt) = page_phys.to_virt_checked() {
            let ptr = virt.as_mut_ptr::<u8>();
            for i in 0..4096 {
                let expected = ((page as u8).wrapping_mul(17)).wrapping_add((i & 0xFF) as u8);
                let actual = unsafe { ptr.add(i).read_volatile() };
                if actual != expected {
                    free_page_frame(phys);
                    return fail!(
                        "multipage corruption page={} offset={}: expected {:#x}, got {:#x}",
                        page,
                        i,
                        expected,
                        actual
                    );
                }
            }
        }
    }

    free_page_frame(phys);
    pass!()
}

// ============================================================================
// SUITE REGISTRATION — tests are auto-collected via linker section
// ============================================================================

use chronos_lib::define_test_suite;

define_test_suite!(
    vm,
    [
        test_vm_env_pgdir_create_destroy,
        test_vm_insert_lookup_remove,
        test_vm_cow_bit_roundtrips,
        test_vm_self_remap_preserves_refcount,
    ]
);

define_test_suite!(
    heap,
    [
        test_heap_free_list_search,
        test_heap_fragmentation_behind_head,
    ]
);

define_test_suite!(
    page_alloc,
    [
        test_page_alloc_single,
        test_page_alloc_multi_order,
        test_page_alloc_free_cycle,
        test_page_alloc_zeroed,
        test_page_alloc_refcount,
        test_page_alloc_stats,
        test_page_alloc_free_null,
        test_page_alloc_fragmentation,
    ]
);

define_test_suite!(
    heap_ext,
    [
        test_heap_warmup_pages_minimum,
        test_heap_small_alloc,
        test_heap_medium_alloc,
        test_heap_large_alloc,
        test_heap_kzalloc_zeroed,
        test_heap_kfree_null,
        test_heap_alloc_zero,
        test_heap_stats,
        test_global_alloc_vec,
    ]
);

define_test_suite!(
    paging,
    [
        test_paging_virt_to_phys,
        test_paging_get_kernel_dir,
        test_paging_user_accessible_kernel,
    ]
);

define_test_suite!(
    ring_buf,
    [
        test_ring_buffer_basic,
        test_ring_buffer_fifo,
        test_ring_buffer_empty_pop,
        test_ring_buffer_full,
        test_ring_buffer_overwrite,
        test_ring_buffer_wrap,
        test_ring_buffer_reset,
        test_ring_buffer_capacity,
    ]
);

define_test_suite!(
    irqmutex,
    [
        test_irqmutex_basic,
        test_irqmutex_mutation,
        test_irqmutex_try_lock,
    ]
);

define_test_suite!(
    rigorous,
    [
        test_page_alloc_write_verify,
        test_page_alloc_zero_full_page,
        test_page_alloc_no_stale_data,
        test_heap_boundary_write,
        test_heap_no_overlap,
        test_heap_double_free_defensive,
        test_heap_large_block_integrity,
        test_heap_stress_cycles,
        test_page_alloc_multipage_integrity,
    ]
);
