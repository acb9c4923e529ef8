//! Convenience re-export of the address-space and paging constants scattered
//! across [`memory_layout_defs`](crate::memory_layout_defs) and
//! [`paging_defs`](crate::paging_defs), for modules that want both without
//! two `use` lines.

pub use crate::memory_layout_defs::{
    BOOT_STACK_PHYS_ADDR, BOOT_STACK_SIZE, EARLY_PD_PHYS_ADDR, EARLY_PDPT_PHYS_ADDR,
    EARLY_PML4_PHYS_ADDR, HHDM_VIRT_BASE, KERNEL_HEAP_SIZE, KERNEL_HEAP_VBASE,
    KERNEL_VIRTUAL_BASE, MAX_PROCESSES, MMIO_VIRT_BASE, MMIO_VIRT_SIZE, PROCESS_CODE_START_VA,
    PROCESS_DATA_START_VA, PROCESS_HEAP_MAX_VA, PROCESS_HEAP_START_VA, PROCESS_STACK_SIZE_BYTES,
    PROCESS_STACK_TOP_VA, USER_SPACE_END_VA, USER_SPACE_START_VA,
};

pub use crate::paging_defs::{PAGE_SIZE_1GB, PAGE_SIZE_2MB, PAGE_SIZE_4KB, PageFlags};
