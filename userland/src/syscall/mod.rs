//! Thin, one-function-per-syscall wrappers over the raw `syscallN`
//! primitives, grounded on the teacher's `userland/src/syscall/*`
//! one-wrapper-per-syscall convention but re-pointed at the syscall list in
//! `chronos_abi::syscall` instead of the teacher's POSIX-ish surface.

pub mod raw;

use chronos_abi::env::{EnvId, ENVPUBLIC_PER_PAGE, EnvPublic, PteFlags, TrapFrame, envx};
use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_abi::syscall::*;
use chronos_abi::UENVS;

/// Every raw syscall returns a signed result on the wire: non-negative is
/// success (sometimes a payload), negative is a `ChronosError` code.
fn decode(raw: u64) -> ChronosResult<u64> {
    let signed = raw as i64;
    if signed < 0 {
        Err(ChronosError::from_code(signed as i32).unwrap_or(ChronosError::Inval))
    } else {
        Ok(raw)
    }
}

pub fn cputs(s: &str) {
    unsafe {
        raw::syscall2(SYS_CPUTS, s.as_ptr() as u64, s.len() as u64);
    }
}

pub fn cgetc() -> i32 {
    unsafe { raw::syscall0(SYS_CGETC) as i32 }
}

pub fn getenvid() -> EnvId {
    unsafe { raw::syscall0(SYS_GETENVID) as EnvId }
}

pub fn env_destroy(id: EnvId) -> ChronosResult<()> {
    decode(unsafe { raw::syscall1(SYS_ENV_DESTROY, id as u64) }).map(|_| ())
}

/// Give up the remainder of this environment's turn. The dispatcher
/// re-enters the scheduler directly rather than returning through the
/// normal syscall path, so by the time this environment runs again its
/// saved register state is whatever it was at the `syscall` instruction
/// (not a decoded result) — there is nothing meaningful to return.
pub fn sys_yield() {
    unsafe {
        raw::syscall0(SYS_YIELD);
    }
}

/// Creates a child environment that is an exact copy of the caller except
/// for its return value (0 in the child, the new envid in the parent) and
/// its `NOT_RUNNABLE` status. The child never runs until the caller calls
/// `env_set_status`.
pub fn exofork() -> ChronosResult<EnvId> {
    decode(unsafe { raw::syscall0(SYS_EXOFORK) }).map(|v| v as EnvId)
}

pub fn env_set_status(id: EnvId, status: u32) -> ChronosResult<()> {
    decode(unsafe { raw::syscall2(SYS_ENV_SET_STATUS, id as u64, status as u64) }).map(|_| ())
}

pub fn env_set_trapframe(id: EnvId, tf: &TrapFrame) -> ChronosResult<()> {
    decode(unsafe { raw::syscall2(SYS_ENV_SET_TRAPFRAME, id as u64, tf as *const TrapFrame as u64) })
        .map(|_| ())
}

pub fn env_set_pgfault_upcall(id: EnvId, upcall: usize) -> ChronosResult<()> {
    decode(unsafe {
        raw::syscall2(SYS_ENV_SET_PGFAULT_UPCALL, id as u64, upcall as u64)
    })
    .map(|_| ())
}

pub fn page_alloc(id: EnvId, va: usize, perm: PteFlags) -> ChronosResult<()> {
    decode(unsafe {
        raw::syscall3(SYS_PAGE_ALLOC, id as u64, va as u64, perm.bits() as u64)
    })
    .map(|_| ())
}

pub fn page_map(
    src_id: EnvId,
    src_va: usize,
    dst_id: EnvId,
    dst_va: usize,
    perm: PteFlags,
) -> ChronosResult<()> {
    decode(unsafe {
        raw::syscall5(
            SYS_PAGE_MAP,
            src_id as u64,
            src_va as u64,
            dst_id as u64,
            dst_va as u64,
            perm.bits() as u64,
        )
    })
    .map(|_| ())
}

pub fn page_unmap(id: EnvId, va: usize) -> ChronosResult<()> {
    decode(unsafe { raw::syscall2(SYS_PAGE_UNMAP, id as u64, va as u64) }).map(|_| ())
}

/// Permission bits mapped at `va` in `id`'s (`0` = caller's own) address
/// space, or `Err(NotFound)` if nothing is mapped there. Used by `fork` to
/// classify each of the caller's own pages before remapping it.
pub fn page_lookup(id: EnvId, va: usize) -> ChronosResult<PteFlags> {
    decode(unsafe { raw::syscall2(SYS_PAGE_LOOKUP, id as u64, va as u64) })
        .map(|bits| PteFlags::from_bits_truncate(bits))
}

pub fn env_convert(id: EnvId) -> ! {
    unsafe {
        raw::syscall1(SYS_ENV_CONVERT, id as u64);
    }
    unreachable!("env_convert re-enters the scheduler as the converted environment")
}

pub fn chdir(path: &str) -> ChronosResult<()> {
    decode(unsafe { raw::syscall2(SYS_CHDIR, path.as_ptr() as u64, path.len() as u64) }).map(|_| ())
}

/// Returns `Ok(())` on success, `Err(IpcNotRecv)` if `to` was not
/// receiving — callers needing the spec's "retry indefinitely" behavior
/// should use [`ipc_send`] in the sibling `ipc` module instead.
pub fn ipc_try_send(to: EnvId, value: u32, srcva: usize, perm: PteFlags) -> ChronosResult<()> {
    decode(unsafe {
        raw::syscall4(
            SYS_IPC_TRY_SEND,
            to as u64,
            value as u64,
            srcva as u64,
            perm.bits() as u64,
        )
    })
    .map(|_| ())
}

/// Returns `(from, value, perm)` once a sender completes the rendezvous.
///
/// `sys_ipc_recv` never returns to its caller the normal way — the
/// dispatcher parks the environment and re-enters the scheduler, so by
/// the time execution resumes here (via the trap-frame restore a
/// successful sender triggered) the raw syscall has already "returned"
/// 0. The actual `from`/`value`/`perm` the sender delivered live in the
/// kernel's `Environment` struct, which user code cannot address
/// directly; they are read back out of the read-only environment-table
/// mirror mapped at [`chronos_abi::UENVS`] instead.
/// Reads this environment's own record out of the read-only environment
/// table mirror mapped at [`UENVS`] (the same mechanism [`ipc_recv`] uses
/// to retrieve what a sender delivered).
fn read_self_public() -> EnvPublic {
    let me = getenvid();
    let idx = envx(me);
    let page = idx / ENVPUBLIC_PER_PAGE;
    let offset = idx % ENVPUBLIC_PER_PAGE;
    // SAFETY: the kernel maps UENVS_PAGES read-only pages at UENVS into
    // every environment at creation, one page per `page` index; `offset`
    // stays within that page because ENVPUBLIC_PER_PAGE/UENVS_PAGES are
    // sized for NENV.
    unsafe {
        let page_base = (UENVS as *const u8).add(page * chronos_abi::PAGE_SIZE as usize);
        let slot = (page_base as *const EnvPublic).add(offset);
        core::ptr::read_unaligned(slot)
    }
}

pub fn ipc_recv(dstva: usize, srcenv: EnvId) -> ChronosResult<(EnvId, u32, PteFlags)> {
    decode(unsafe { raw::syscall2(SYS_IPC_RECV, dstva as u64, srcenv as u64) })?;
    let rec = read_self_public();
    Ok((rec.ipc_from, rec.ipc_value, rec.ipc_perm))
}

/// This environment's parent, as recorded by the kernel at `exofork` time
/// and exposed read-only through the [`UENVS`] mirror. There is no
/// `getppid`-style syscall; this is how userland learns it without one.
pub fn parent_envid() -> EnvId {
    read_self_public().parent_id
}

pub fn time_msec() -> i64 {
    unsafe { raw::syscall0(SYS_TIME_MSEC) as i64 }
}

pub fn net_transmit(buf: &[u8]) -> ChronosResult<usize> {
    decode(unsafe { raw::syscall2(SYS_NET_TRANSMIT, buf.as_ptr() as u64, buf.len() as u64) })
        .map(|n| n as usize)
}

pub fn net_receive(buf: &mut [u8]) -> ChronosResult<usize> {
    decode(unsafe { raw::syscall2(SYS_NET_RECEIVE, buf.as_mut_ptr() as u64, buf.len() as u64) })
        .map(|n| n as usize)
}

pub fn mac_addr() -> u64 {
    let lo = unsafe { raw::syscall0(SYS_MAC_ADDR_LOW) };
    let hi = unsafe { raw::syscall0(SYS_MAC_ADDR_HIGH) };
    (hi << 32) | (lo & 0xFFFF_FFFF)
}
