//! Per-syscall bodies. Every user pointer is validated before use via
//! `chronos_mm::user_ptr`/`user_copy`, per `spec.md` §4.3: "A user address
//! is valid iff strictly below USER_TOP and, for page-level operations,
//! aligned to [the page size]."

use chronos_abi::addr::VirtAddr;
use chronos_abi::env::{EnvId, EnvStatus, PteFlags, TrapFrame};
use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_mm::user_copy::copy_bytes_from_user;
use chronos_mm::user_ptr::{UserBytes, UserPtr};
use chronos_mm::vm;

use crate::{env, ipc, sched};

fn to_inval<E>(_: E) -> ChronosError {
    ChronosError::Inval
}

fn require_perm(perm: u64) -> ChronosResult<PteFlags> {
    if perm & !PteFlags::SYSCALL.bits() != 0 {
        return Err(ChronosError::Inval);
    }
    Ok(PteFlags::from_bits_truncate(perm))
}

// --- console -----------------------------------------------------------

pub fn sys_cputs(va: u64, len: usize) -> ChronosResult<i32> {
    let user = UserBytes::try_new(va, len).map_err(to_inval)?;
    let mut buf = [0u8; 256];
    let n = len.min(buf.len());
    let copied = copy_bytes_from_user(user, &mut buf[..n]).map_err(to_inval)?;
    let s = core::str::from_utf8(&buf[..copied]).map_err(to_inval)?;
    chronos_drivers::serial::write_str(s);
    Ok(copied as i32)
}

pub fn sys_cgetc() -> ChronosResult<i32> {
    const COM1_BASE: u16 = 0x3F8;
    let mut byte: u8 = 0;
    let got = chronos_drivers::serial::serial_buffer_read(COM1_BASE, &mut byte as *mut u8);
    if got == 0 { Ok(byte as i32) } else { Ok(-1) }
}

// --- environment lifecycle ----------------------------------------------

pub fn sys_env_destroy(caller: EnvId, id: EnvId) -> ChronosResult<i32> {
    let target = env::envid2env(id, true)?;
    env::env_destroy(target);
    Ok(if target == caller {
        // The caller just destroyed itself; there is nothing to return to.
        sched::run()
    } else {
        0
    })
}

pub fn sys_yield(caller: EnvId) -> ChronosResult<i32> {
    sched::do_yield(caller)
}

pub fn sys_exofork(caller: EnvId) -> ChronosResult<i32> {
    let child = env::exofork(caller)?;
    // The child's own observed return value is 0 (spec.md §4.3); only the
    // parent sees the envid.
    env::with_env(child, |e| e.trap_frame.rax = 0);
    Ok(child as i32)
}

pub fn sys_env_set_status(caller: EnvId, id: EnvId, status: u64) -> ChronosResult<i32> {
    let target = env::envid2env(id, true)?;
    let _ = caller;
    let status = match status {
        1 => EnvStatus::Runnable,
        2 => EnvStatus::NotRunnable,
        _ => return Err(ChronosError::Inval),
    };
    env::env_set_status(target, status)?;
    Ok(0)
}

pub fn sys_env_set_trapframe(caller: EnvId, id: EnvId, tf_va: u64) -> ChronosResult<i32> {
    let target = env::envid2env(id, true)?;
    let _ = caller;
    let ptr = UserPtr::<TrapFrame>::try_new(tf_va).map_err(to_inval)?;
    let tf = chronos_mm::user_copy::copy_from_user(ptr).map_err(to_inval)?;
    env::env_set_trapframe(target, tf);
    Ok(0)
}

pub fn sys_env_set_pgfault_upcall(caller: EnvId, id: EnvId, va: u64) -> ChronosResult<i32> {
    let target = env::envid2env(id, true)?;
    let _ = caller;
    env::env_set_pgfault_upcall(target, va);
    Ok(0)
}

pub fn sys_env_convert(caller: EnvId, id: EnvId) -> ChronosResult<i32> {
    let target = env::envid2env(id, true)?;
    env::env_convert(caller, target)?;
    Ok(sched::run())
}

pub fn sys_chdir(caller: EnvId, path_va: u64, len: usize) -> ChronosResult<i32> {
    let user = UserBytes::try_new(path_va, len).map_err(to_inval)?;
    let mut buf = [0u8; env::CWD_MAX_LEN];
    let n = len.min(buf.len());
    let copied = copy_bytes_from_user(user, &mut buf[..n]).map_err(to_inval)?;
    let s = core::str::from_utf8(&buf[..copied]).map_err(to_inval)?;
    env::chdir(caller, s);
    Ok(0)
}

// --- virtual memory -------------------------------------------------------

pub fn sys_page_alloc(caller: EnvId, id: EnvId, va: u64, perm: u64) -> ChronosResult<i32> {
    let target = env::envid2env(id, true)?;
    let perm = require_perm(perm)?;
    if !VirtAddr::new(va).is_aligned(chronos_abi::PAGE_SIZE) || va >= chronos_abi::USER_TOP {
        return Err(ChronosError::Inval);
    }
    let pgdir = env::with_env(target, |e| e.pgdir);
    let phys = vm::page_alloc()?;
    if let Err(e) = vm::page_insert(pgdir, VirtAddr::new(va), phys, perm) {
        vm::page_free(phys);
        return Err(e);
    }
    let _ = caller;
    Ok(0)
}

pub fn sys_page_map(
    caller: EnvId,
    srcid: EnvId,
    srcva: u64,
    dstid: EnvId,
    dstva: u64,
    perm: u64,
) -> ChronosResult<i32> {
    let _ = caller;
    let src = env::envid2env(srcid, true)?;
    let dst = env::envid2env(dstid, true)?;
    let perm = require_perm(perm)?;
    if !VirtAddr::new(srcva).is_aligned(chronos_abi::PAGE_SIZE)
        || !VirtAddr::new(dstva).is_aligned(chronos_abi::PAGE_SIZE)
        || srcva >= chronos_abi::USER_TOP
        || dstva >= chronos_abi::USER_TOP
    {
        return Err(ChronosError::Inval);
    }
    let src_pgdir = env::with_env(src, |e| e.pgdir);
    let dst_pgdir = env::with_env(dst, |e| e.pgdir);
    let (phys, src_perm) =
        vm::page_lookup(src_pgdir, VirtAddr::new(srcva)).ok_or(ChronosError::Inval)?;
    if perm.contains(PteFlags::WRITABLE) && !src_perm.contains(PteFlags::WRITABLE) {
        return Err(ChronosError::Inval);
    }
    vm::page_insert(dst_pgdir, VirtAddr::new(dstva), phys, perm)?;
    Ok(0)
}

pub fn sys_page_unmap(caller: EnvId, id: EnvId, va: u64) -> ChronosResult<i32> {
    let _ = caller;
    let target = env::envid2env(id, true)?;
    let pgdir = env::with_env(target, |e| e.pgdir);
    vm::page_remove(pgdir, VirtAddr::new(va));
    Ok(0)
}

/// Backs `chronos_userland::syscall::page_lookup`, which user-space `fork`
/// uses to classify each of its own mapped pages before deciding how to
/// remap it into the child (spec.md §4.4 step 2). Not part of the
/// original syscall list named in `spec.md` §4.3; see `chronos_abi::
/// syscall`'s doc comment.
pub fn sys_page_lookup(caller: EnvId, id: EnvId, va: u64) -> ChronosResult<i32> {
    let _ = caller;
    let target = env::envid2env(id, true)?;
    if va >= chronos_abi::USER_TOP {
        return Err(ChronosError::Inval);
    }
    let pgdir = env::with_env(target, |e| e.pgdir);
    let (_, perm) = vm::page_lookup(pgdir, VirtAddr::new(va)).ok_or(ChronosError::NotFound)?;
    Ok(perm.bits() as i32)
}

// --- IPC -------------------------------------------------------------------

pub fn sys_ipc_try_send(
    caller: EnvId,
    to: EnvId,
    value: u32,
    srcva: u64,
    perm: u32,
) -> ChronosResult<i32> {
    let perm = require_perm(perm as u64)?;
    ipc::ipc_try_send(caller, to, value, srcva, perm)?;
    Ok(0)
}

pub fn sys_ipc_recv(caller: EnvId, dstva: u64, srcenv: EnvId) -> ChronosResult<i32> {
    if dstva < chronos_abi::USER_TOP && !VirtAddr::new(dstva).is_aligned(chronos_abi::PAGE_SIZE) {
        return Err(ChronosError::Inval);
    }
    ipc::ipc_recv(caller, dstva, srcenv);
    Ok(sched::run())
}

// --- time / net -------------------------------------------------------------

pub fn sys_time_msec() -> i32 {
    crate::time::now_ms() as i32
}

pub fn sys_net_transmit(va: u64, len: usize) -> ChronosResult<i32> {
    let user = UserBytes::try_new(va, len).map_err(to_inval)?;
    let mut buf = [0u8; chronos_abi::nic::MAX_PACKET_BUF];
    let n = len.min(buf.len());
    let copied = copy_bytes_from_user(user, &mut buf[..n]).map_err(to_inval)?;
    chronos_drivers::nic::net_transmit(&buf[..copied])?;
    Ok(copied as i32)
}

pub fn sys_net_receive(va: u64, len: usize) -> ChronosResult<i32> {
    let mut buf = [0u8; chronos_abi::nic::MAX_PACKET_BUF];
    let n = len.min(buf.len());
    let got = chronos_drivers::nic::net_receive(&mut buf[..n])?;
    let user = UserBytes::try_new(va, got).map_err(to_inval)?;
    chronos_mm::user_copy::copy_bytes_to_user(user, &buf[..got]).map_err(to_inval)?;
    Ok(got as i32)
}

pub fn sys_mac_addr_low() -> ChronosResult<i32> {
    let mac = chronos_drivers::nic::mac_address()?;
    Ok(u32::from_le_bytes([mac[0], mac[1], mac[2], mac[3]]) as i32)
}

pub fn sys_mac_addr_high() -> ChronosResult<i32> {
    let mac = chronos_drivers::nic::mac_address()?;
    Ok(u16::from_le_bytes([mac[4], mac[5]]) as i32)
}
