//! chronos kernel-userland ABI types.
//!
//! This crate is the single source of truth for every type that crosses the
//! kernel/userland boundary: addresses, syscall numbers, error kinds, the
//! on-disk file record layout, environment/trapframe shapes, and the NIC
//! descriptor-ring format. Having one crate for these eliminates duplicate
//! definitions and ABI drift between the kernel and `userland`.
//!
//! All wire/on-disk structs are `#[repr(C)]` for layout stability.

#![no_std]
#![forbid(unsafe_code)]

pub mod addr;
pub mod env;
pub mod error;
pub mod fs;
pub mod nic;
pub mod syscall;
pub mod time;

/// Standard 4KB page size.
pub const PAGE_SIZE: u64 = 0x1000;

/// Top of user address space. Anything at or above this is kernel-only;
/// `page_map`/`page_alloc` reject destination addresses `>= USER_TOP`.
pub const USER_TOP: u64 = 0x0000_8000_0000_0000;

/// Address of each environment's single exception stack page, one page
/// below `USER_TOP`. Installed by `fork`/`pgfault` setup, never COW'd.
pub const UXSTACKTOP: u64 = USER_TOP;

/// Base VA of the read-only environment-table mirror mapped into every
/// environment's address space. The kernel's `Environment` struct (its
/// page directory pointer, trap frame, and other kernel-only state) never
/// leaves the kernel; this mirror publishes only the fields a caller
/// legitimately needs after a syscall that "does not return" in the usual
/// sense, chiefly the `ipc_from`/`ipc_value`/`ipc_perm` a blocked
/// `ipc_recv` was woken up with. Spans [`env::UENVS_PAGES`] pages holding
/// one [`env::EnvPublic`] record per slot in `env::envx` order; the same
/// physical frames are shared (never copied) across every environment.
pub const UENVS: u64 = USER_TOP - 0x0040_0000;

/// Fixed scratch VA `fork`'s page-fault handler maps its private copy of a
/// faulting COW page at, before remapping it over the fault address and
/// unmapping this one (spec.md §4.4's "fault resolution"). Any environment
/// using it owns it exclusively for the duration of one fault.
pub const PFTEMP: u64 = USER_TOP - 0x0044_0000;

pub use addr::*;
pub use env::*;
pub use error::*;
pub use fs::*;
pub use nic::*;
pub use syscall::*;
pub use time::*;
