//! Syscall number definitions (kernel-userland ABI).
//!
//! This module is the single source of truth for the syscall numbers listed
//! in `spec.md` §4.3, plus `SYS_PAGE_LOOKUP` — user-space `fork` needs to
//! inspect the permission bits of its own already-mapped pages (spec.md
//! §4.4 step 2), and the primitive list has no other way to get that
//! without exposing raw page table memory. Both `chronos-core` (dispatcher)
//! and `chronos-userland` (library wrappers) import from here so the two
//! sides can never drift.

pub const SYS_CPUTS: u64 = 0;
pub const SYS_CGETC: u64 = 1;
pub const SYS_GETENVID: u64 = 2;
pub const SYS_ENV_DESTROY: u64 = 3;
pub const SYS_YIELD: u64 = 4;
pub const SYS_EXOFORK: u64 = 5;
pub const SYS_ENV_SET_STATUS: u64 = 6;
pub const SYS_ENV_SET_TRAPFRAME: u64 = 7;
pub const SYS_ENV_SET_PGFAULT_UPCALL: u64 = 8;
pub const SYS_PAGE_ALLOC: u64 = 9;
pub const SYS_PAGE_MAP: u64 = 10;
pub const SYS_PAGE_UNMAP: u64 = 11;
pub const SYS_ENV_CONVERT: u64 = 12;
pub const SYS_CHDIR: u64 = 13;
pub const SYS_IPC_TRY_SEND: u64 = 14;
pub const SYS_IPC_RECV: u64 = 15;
pub const SYS_TIME_MSEC: u64 = 16;
pub const SYS_NET_TRANSMIT: u64 = 17;
pub const SYS_NET_RECEIVE: u64 = 18;
pub const SYS_MAC_ADDR_LOW: u64 = 19;
pub const SYS_MAC_ADDR_HIGH: u64 = 20;
/// Returns the permission bits mapped at a VA in `id`'s (or the caller's,
/// for `id == 0`) address space, or `NotFound` if nothing is mapped there.
pub const SYS_PAGE_LOOKUP: u64 = 21;

/// One past the highest syscall number; the dispatcher rejects numbers `>=`
/// this with [`crate::ChronosError::Inval`].
pub const SYSCALL_COUNT: usize = 22;

/// Raw argument bundle the trampoline hands the dispatcher: the syscall
/// number plus up to five `u32` arguments, matching the spec's "reads the
/// number plus up to five 32-bit arguments" contract. The trampoline itself
/// is an external seam (`spec.md` non-goals); this struct is its calling
/// convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallArgs {
    pub num: u32,
    pub a1: u32,
    pub a2: u32,
    pub a3: u32,
    pub a4: u32,
    pub a5: u32,
}
