//! Higher-level IPC built on the raw `syscall` rendezvous primitives:
//! indefinite retry for senders, and a typed receive that hands back
//! whatever page landed at the destination VA.
//!
//! Grounded on the teacher's thin-userland-wrapper convention
//! (`userland/src/syscall/*`); there is no teacher IPC layer to adapt from
//! (its tasks share kernel-managed memory instead), so the retry loop here
//! follows spec.md §4.5 directly: a send only succeeds once its target is
//! already blocked in `ipc_recv`, and there is no queue to enqueue behind,
//! so a sender that loses the race just yields and tries again.

use chronos_abi::env::{EnvId, PteFlags};
use chronos_abi::error::{ChronosError, ChronosResult};

use crate::syscall;

/// Send `value` to `to`, retrying until `to` is parked in `ipc_recv` and
/// accepts it. Pass `page` to also transfer the page mapped at that VA in
/// the caller's own address space, with `perm` as its requested
/// permission (ignored when `page` is `None`).
pub fn ipc_send(to: EnvId, value: u32, page: Option<usize>, perm: PteFlags) {
    let (srcva, perm) = match page {
        Some(va) => (va, perm),
        None => (0, PteFlags::empty()),
    };
    loop {
        match syscall::ipc_try_send(to, value, srcva, perm) {
            Ok(()) => return,
            Err(ChronosError::IpcNotRecv) => syscall::sys_yield(),
            Err(_) => return,
        }
    }
}

/// Result of a completed receive: who sent it, the 32-bit value, and
/// (if a page was transferred) the permission it arrived with.
pub struct Message {
    pub from: EnvId,
    pub value: u32,
    pub perm: PteFlags,
}

/// Block until a message arrives (optionally filtered to `from_env`, `0`
/// meaning "anyone"), asking for any transferred page to land at `dstva`.
/// Pass `0` (or any address `>= USER_TOP`) for `dstva` to decline pages.
pub fn ipc_recv(dstva: usize, from_env: EnvId) -> ChronosResult<Message> {
    let (from, value, perm) = syscall::ipc_recv(dstva, from_env)?;
    Ok(Message { from, value, perm })
}
