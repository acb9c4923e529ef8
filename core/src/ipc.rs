//! Rendezvous IPC: `ipc_try_send` / `ipc_recv` (`spec.md` §4.5).
//!
//! No kernel message queue exists; a send only ever succeeds against an
//! environment already blocked inside `ipc_recv`. There is no FIFO
//! fairness guarantee across senders — whichever sender the cooperative
//! scheduler happens to run next, once the receiver is receptive, wins.

use chronos_abi::addr::VirtAddr;
use chronos_abi::env::{EnvId, EnvStatus, PteFlags};
use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_mm::vm;

use crate::env;

/// Sender side. `srcva < USER_TOP` means "also transfer the page mapped at
/// `srcva` in the sender's own directory"; `0` (or any value `>= USER_TOP`)
/// means "value only, no page".
pub fn ipc_try_send(
    sender: EnvId,
    to: EnvId,
    value: u32,
    srcva: u64,
    perm: PteFlags,
) -> ChronosResult<()> {
    let target = env::envid2env(to, false)?;

    let (recving, dstva, from_filter, target_pgdir) =
        env::with_env(target, |e| (e.ipc_recving, e.ipc_dstva, e.ipc_from_filter, e.pgdir));
    if !recving {
        return Err(ChronosError::IpcNotRecv);
    }
    if from_filter != 0 && from_filter != sender {
        return Err(ChronosError::IpcNotRecv);
    }

    let sends_page = srcva < chronos_abi::USER_TOP;
    let wants_page = dstva < chronos_abi::USER_TOP;
    if sends_page && wants_page {
        if !perm.is_syscall_legal() {
            return Err(ChronosError::Inval);
        }
        let sender_pgdir = env::with_env(sender, |e| e.pgdir);
        let src = VirtAddr::new(srcva);
        let (paddr, src_perm) = vm::page_lookup(sender_pgdir, src).ok_or(ChronosError::Inval)?;
        if perm.contains(PteFlags::WRITABLE) && !src_perm.contains(PteFlags::WRITABLE) {
            return Err(ChronosError::Inval);
        }
        vm::page_insert(target_pgdir, VirtAddr::new(dstva), paddr, perm)?;
    }

    env::with_env(target, |e| {
        e.ipc_recving = false;
        e.ipc_from = sender;
        e.ipc_value = value;
        e.ipc_perm = if sends_page && wants_page {
            perm
        } else {
            PteFlags::empty()
        };
        e.trap_frame.rax = 0;
        e.status = EnvStatus::Runnable;
    });
    env::sync_mirror(target);
    Ok(())
}

/// Receiver side: park `recv` waiting for `srcenv` (`0` = anyone) to send,
/// recording where a transferred page (if any) should land. Always leaves
/// the environment `NotRunnable`; the caller (the syscall handler) must
/// invoke the scheduler immediately afterwards, since this call "does not
/// return" in the normal sense (`spec.md` §9).
pub fn ipc_recv(recv: EnvId, dstva: u64, srcenv: EnvId) {
    env::with_env(recv, |e| {
        e.ipc_recving = true;
        e.ipc_dstva = dstva;
        e.ipc_from_filter = srcenv;
        e.status = EnvStatus::NotRunnable;
    });
    env::sync_mirror(recv);
}
