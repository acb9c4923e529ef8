//! Environment identity, page permission bits, and trap frame shapes.

/// Environment id: encodes a generation count in the high bits and a table
/// slot index in the low bits, so a reused slot gets a distinct id from its
/// predecessor. Zero is never a valid id.
pub type EnvId = u32;

/// Number of slot bits in an [`EnvId`]. `NENV` must be a power of two.
pub const ENVX_BITS: u32 = 10;

/// Maximum number of live environments.
pub const NENV: usize = 1 << ENVX_BITS;

/// Extract the table slot index from an environment id.
#[inline]
pub const fn envx(envid: EnvId) -> usize {
    (envid as usize) & (NENV - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvStatus {
    /// Slot is unused and on the free list.
    Free = 0,
    /// Eligible to be scheduled.
    Runnable = 1,
    /// Alive but not currently schedulable (e.g. blocked in `ipc_recv`).
    NotRunnable = 2,
    /// Marked for destruction; reaped on the next scheduler pass.
    Dying = 3,
}

bitflags::bitflags! {
    /// Page table entry permission bits. The low three (`PRESENT`,
    /// `WRITABLE`, `USER`) are real hardware bits; `COW` and `SHARED` are
    /// software-only bits in positions reserved as available-to-software
    /// on every paging architecture this ABI targets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        const PRESENT  = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER     = 1 << 2;
        /// Software bit: page is copy-on-write. Write faults on a page
        /// with this bit set (and `WRITABLE` clear) are resolved in
        /// userland, never by the kernel.
        const COW      = 1 << 9;
        /// Software bit: page is shared verbatim across a fork instead of
        /// being marked copy-on-write (used for pages like the environment
        /// table mapping).
        const SHARED   = 1 << 10;
    }
}

impl PteFlags {
    /// The only bits a syscall caller is allowed to set on a mapping.
    /// Any other bit present in a requested permission word is rejected
    /// with `Inval`.
    pub const SYSCALL: Self = Self::from_bits_truncate(
        Self::PRESENT.bits()
            | Self::WRITABLE.bits()
            | Self::USER.bits()
            | Self::COW.bits()
            | Self::SHARED.bits(),
    );

    /// True if `self` contains only bits from [`PteFlags::SYSCALL`].
    #[inline]
    pub fn is_syscall_legal(self) -> bool {
        self.bits() & !Self::SYSCALL.bits() == 0
    }
}

/// Saved CPU register state for an environment. Shape only — the
/// assembly trampoline that saves/restores these registers across a trap
/// is an external seam (see `spec.md` non-goals); this struct is the
/// calling-convention contract the trampoline and the kernel agree on.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub trapno: u64,
    pub err: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Argument passed to a user pagefault upcall: the user trap frame at the
/// moment of the fault plus the fault metadata the handler needs to decide
/// whether it is a (supported) COW write fault.
///
/// The handler runs on the environment's private exception stack
/// ([`crate::UXSTACKTOP`]) and must never itself fault while running on
/// that stack — there is no second-level exception stack to catch it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UTrapframe {
    pub fault_va: u64,
    pub err: u64,
    pub trap_frame: TrapFrame,
}

/// Kind tag for an environment, mirroring the minimal JOS-style
/// distinction between the kernel-spawned "init" environment and
/// everything forked or exec'd afterward. Advisory only; carries no
/// privilege of its own beyond what `envid2env` checks already enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvType {
    Idle,
    User,
    FileServer,
    NetServer,
}

/// One slot of the read-only environment-table mirror at
/// [`crate::UENVS`]. A trimmed, advisory-only view of the kernel's
/// `Environment` struct — just enough for user code to read back the
/// outcome of an IPC rendezvous or check another environment's status,
/// never anything that would let user code reach into kernel state
/// (no page directory pointer, no trap frame, no CWD).
///
/// Per `spec.md`'s concurrency note: fields here can change out from under
/// a reader at any point the scheduler runs another environment, so a
/// reader must treat them as a snapshot, not a synchronization primitive.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EnvPublic {
    pub env_id: EnvId,
    pub parent_id: EnvId,
    pub status: EnvStatus,
    pub env_type: EnvType,
    /// Nonzero while this environment is blocked inside `ipc_recv`.
    pub ipc_recving: u8,
    _pad: [u8; 3],
    /// Sender of the most recently completed receive.
    pub ipc_from: EnvId,
    /// Value delivered by the most recently completed receive.
    pub ipc_value: u32,
    /// Permission bits the transferred page (if any) was mapped with.
    pub ipc_perm: PteFlags,
}

impl EnvPublic {
    pub const EMPTY: EnvPublic = EnvPublic {
        env_id: 0,
        parent_id: 0,
        status: EnvStatus::Free,
        env_type: EnvType::Idle,
        ipc_recving: 0,
        _pad: [0; 3],
        ipc_from: 0,
        ipc_value: 0,
        ipc_perm: PteFlags::empty(),
    };
}

/// Size in bytes of one [`EnvPublic`] record, as laid out on the wire.
pub const ENVPUBLIC_SIZE: usize = core::mem::size_of::<EnvPublic>();

/// How many [`EnvPublic`] records fit in one page of the mirror.
pub const ENVPUBLIC_PER_PAGE: usize = (crate::PAGE_SIZE as usize) / ENVPUBLIC_SIZE;

/// Page count of the [`crate::UENVS`] mapping: enough pages to hold
/// [`NENV`] records.
pub const UENVS_PAGES: usize = (NENV + ENVPUBLIC_PER_PAGE - 1) / ENVPUBLIC_PER_PAGE;
