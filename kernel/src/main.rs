#![no_std]
#![no_main]
#![forbid(unsafe_op_in_unsafe_fn)]
#![feature(alloc_error_handler)]

extern crate alloc;

use core::alloc::Layout;
use core::panic::PanicInfo;
use core::ptr;

use limine::BaseRevision;
use limine::request::{HhdmRequest, MemoryMapRequest};

use chronos_drivers::serial;
use chronos_lib::boot_info::{LimineMemmapEntry, LimineMemmapResponse};
use chronos_lib::{cpu, klog_error, klog_info};
use chronos_mm::KernelAllocator;

#[global_allocator]
static GLOBAL_ALLOCATOR: KernelAllocator = KernelAllocator::new();

#[used]
#[unsafe(link_section = ".limine_requests")]
static BASE_REVISION: BaseRevision = BaseRevision::new();

#[used]
#[unsafe(link_section = ".limine_requests")]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

#[used]
#[unsafe(link_section = ".limine_requests")]
static MEMMAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

/// Mirrors the bootloader's memory map into the plain `repr(C)` shape
/// `chronos_mm::memory_init::init_memory_system` expects, the same way the
/// teacher's own boot crate mirrors it for its (separate) memory-init call.
/// Boot protocol plumbing is an external seam (`spec.md` §1), so this lives
/// inline here rather than behind its own crate.
const MAX_MEMMAP_ENTRIES: usize = 256;

static mut MEMMAP_ENTRIES: [LimineMemmapEntry; MAX_MEMMAP_ENTRIES] = [LimineMemmapEntry {
    base: 0,
    length: 0,
    typ: 0,
}; MAX_MEMMAP_ENTRIES];
static mut MEMMAP_PTRS: [*const LimineMemmapEntry; MAX_MEMMAP_ENTRIES] =
    [ptr::null(); MAX_MEMMAP_ENTRIES];
static mut MEMMAP_RESPONSE: LimineMemmapResponse = LimineMemmapResponse {
    revision: 0,
    entry_count: 0,
    entries: ptr::null(),
};

fn entry_type_to_u64(typ: limine::memory_map::EntryType) -> u64 {
    use limine::memory_map::EntryType;
    if typ == EntryType::USABLE {
        0
    } else if typ == EntryType::ACPI_RECLAIMABLE {
        2
    } else if typ == EntryType::ACPI_NVS {
        3
    } else if typ == EntryType::FRAMEBUFFER {
        7
    } else {
        1
    }
}

fn build_memmap_response() -> *const LimineMemmapResponse {
    let Some(memmap) = MEMMAP_REQUEST.get_response() else {
        return ptr::null();
    };
    let entries = memmap.entries();
    let count = entries.len().min(MAX_MEMMAP_ENTRIES);

    // SAFETY: single-threaded boot, runs exactly once before any interrupt
    // handler or other CPU could observe these statics.
    unsafe {
        let entries_ptr = &raw mut MEMMAP_ENTRIES;
        let ptrs_ptr = &raw mut MEMMAP_PTRS;
        let response_ptr = &raw mut MEMMAP_RESPONSE;

        for (i, entry) in entries.iter().take(count).enumerate() {
            (*entries_ptr)[i] = LimineMemmapEntry {
                base: entry.base,
                length: entry.length,
                typ: entry_type_to_u64(entry.entry_type),
            };
            (*ptrs_ptr)[i] = &(*entries_ptr)[i];
        }
        (*response_ptr).revision = 0;
        (*response_ptr).entry_count = count as u64;
        (*response_ptr).entries = (*ptrs_ptr).as_ptr();
        response_ptr
    }
}

/// Kernel entry point. Limine enters a higher-half kernel directly in long
/// mode with paging and a stack already set up; there is no assembly
/// trampoline here; the GDT/IDT/syscall-entry wiring that would normally
/// run before this point is an external seam (`spec.md` §1).
#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    serial::init();
    chronos_lib::klog_init();

    assert!(
        BASE_REVISION.is_supported(),
        "unsupported Limine base revision"
    );

    let hhdm_offset = HHDM_REQUEST.get_response().map(|r| r.offset()).unwrap_or(0);
    let hhdm_available = HHDM_REQUEST.get_response().is_some();
    let memmap = build_memmap_response();

    klog_info!("chronos: booting");

    if chronos_mm::memory_init::init_memory_system(memmap, hhdm_offset, hhdm_available) != 0 {
        panic!("memory system initialization failed");
    }

    chronos_core::env::init_mirror().expect("environment mirror init failed");
    chronos_core::time::init();

    klog_info!("chronos: core subsystems initialized, entering scheduler");

    #[cfg(feature = "builtin-tests")]
    run_builtin_tests();

    chronos_core::sched::run();
}

#[cfg(feature = "builtin-tests")]
fn run_builtin_tests() {
    chronos_tests::tests_reset_registry();
    chronos_tests::tests_register_system_suites();

    let config = chronos_lib::testing::TestConfig {
        enabled: true,
        ..Default::default()
    };
    let mut summary = chronos_tests::TestRunSummary::default();
    chronos_tests::tests_run_all(&config, &mut summary);
}

fn halt_forever() -> ! {
    loop {
        cpu::halt();
    }
}

#[alloc_error_handler]
fn alloc_error(layout: Layout) -> ! {
    klog_error!("Allocation failure: {:?}", layout);
    halt_forever();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    #[cfg(feature = "builtin-tests")]
    {
        if !chronos_lib::panic_recovery::recovery_is_active() {
            chronos_tests::tests_mark_panic();
        }
    }
    klog_error!("PANIC: {}", info);
    halt_forever();
}
