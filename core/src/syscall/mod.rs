//! Syscall dispatcher (`spec.md` §4.3, §6).
//!
//! One entry point, one jump table, grounded on the teacher's
//! `syscall/dispatch.rs` + `syscall/handlers.rs` convention
//! (a number-indexed jump table, handlers split by subsystem) but
//! re-pointed at `chronos_abi::syscall`'s numbering instead of the
//! teacher's POSIX-ish surface: no `fork`/`exec`/`read`/`write`, since
//! `fork` is pure userland (`chronos-userland::fork`) and file I/O goes
//! over IPC to the FS environment rather than a direct syscall.

mod handlers;

use chronos_abi::error::ChronosError;
use chronos_abi::syscall::*;

use crate::env;

/// Dispatch one syscall for the currently running environment. Returns
/// the raw `i32` to hand back across the trap frame: `>= 0` on success,
/// a negative [`ChronosError`] code on failure.
///
/// `yield`, `ipc_recv`, and `env_convert` on success never return here —
/// they re-enter the scheduler directly (`spec.md` §9) — so this function
/// only returns for every *other* syscall, or for those three on failure.
pub fn syscall_dispatch(args: SyscallArgs) -> i32 {
    let Some(caller) = env::current_envid() else {
        return ChronosError::BadEnv.code();
    };

    let result = match args.num as u64 {
        SYS_CPUTS => handlers::sys_cputs(args.a1 as u64, args.a2 as usize),
        SYS_CGETC => handlers::sys_cgetc(),
        SYS_GETENVID => Ok(caller as i32),
        SYS_ENV_DESTROY => handlers::sys_env_destroy(caller, args.a1),
        SYS_YIELD => handlers::sys_yield(caller),
        SYS_EXOFORK => handlers::sys_exofork(caller),
        SYS_ENV_SET_STATUS => handlers::sys_env_set_status(caller, args.a1, args.a2 as u64),
        SYS_ENV_SET_TRAPFRAME => handlers::sys_env_set_trapframe(caller, args.a1, args.a2 as u64),
        SYS_ENV_SET_PGFAULT_UPCALL => {
            handlers::sys_env_set_pgfault_upcall(caller, args.a1, args.a2 as u64)
        }
        SYS_PAGE_ALLOC => handlers::sys_page_alloc(caller, args.a1, args.a2 as u64, args.a3 as u64),
        SYS_PAGE_MAP => handlers::sys_page_map(
            caller,
            args.a1,
            args.a2 as u64,
            args.a3,
            args.a4 as u64,
            args.a5 as u64,
        ),
        SYS_PAGE_UNMAP => handlers::sys_page_unmap(caller, args.a1, args.a2 as u64),
        SYS_PAGE_LOOKUP => handlers::sys_page_lookup(caller, args.a1, args.a2 as u64),
        SYS_ENV_CONVERT => handlers::sys_env_convert(caller, args.a1),
        SYS_CHDIR => handlers::sys_chdir(caller, args.a1 as u64, args.a2 as usize),
        SYS_IPC_TRY_SEND => {
            handlers::sys_ipc_try_send(caller, args.a1, args.a2, args.a3 as u64, args.a4)
        }
        SYS_IPC_RECV => handlers::sys_ipc_recv(caller, args.a1 as u64, args.a2),
        SYS_TIME_MSEC => Ok(handlers::sys_time_msec()),
        SYS_NET_TRANSMIT => handlers::sys_net_transmit(args.a1 as u64, args.a2 as usize),
        SYS_NET_RECEIVE => handlers::sys_net_receive(args.a1 as u64, args.a2 as usize),
        SYS_MAC_ADDR_LOW => handlers::sys_mac_addr_low(),
        SYS_MAC_ADDR_HIGH => handlers::sys_mac_addr_high(),
        _ => Err(ChronosError::Inval),
    };

    match result {
        Ok(v) => v,
        Err(e) => e.code(),
    }
}
