//! Cooperative round-robin scheduler over the environment table
//! (`spec.md` §4.2, §5).
//!
//! Grounded in the *shape* of the teacher's `scheduler/scheduler.rs`
//! cursor-walk, stripped of everything that exists only to serve multiple
//! CPUs (per-CPU run queues, load balancing, work stealing, reschedule
//! IPIs) — an explicit Non-goal here. There is exactly one CPU, one
//! current environment, and `yield` just asks "who's runnable next?".

use chronos_abi::env::EnvId;
use chronos_lib::klog_info;

use crate::env;

unsafe extern "C" {
    /// Restore `tf` into the CPU and `iretq` into it. Never returns.
    /// Calling convention only is specified here (`spec.md` §9); the body
    /// is the assembly in `context_switch.s`, an external seam.
    fn env_pop_tf(tf: *const chronos_abi::env::TrapFrame) -> !;
}

/// Select the next `Runnable` environment after `current` and switch to
/// it. If none is runnable, halts the CPU waiting for an interrupt
/// (there is nothing else this single-CPU kernel can usefully do).
///
/// Never returns: either it jumps into a user environment via
/// `env_pop_tf`, or it parks the CPU in a `hlt` loop re-checking for
/// runnable work on every interrupt.
pub fn run() -> ! {
    loop {
        let current = env::current_envid();
        let next = env::next_runnable_after(current).or_else(|| env::next_runnable_after(None));

        let Some(next) = next else {
            chronos_lib::cpu::halt();
            continue;
        };

        env::set_current_envid(Some(next));
        env::mark_run(next);
        let (pgdir, tf) = env::with_env(next, |e| (e.pgdir, e.trap_frame));
        if let Err(e) = chronos_mm::vm::switch_to(pgdir) {
            klog_info!("sched: failed to switch to env {:#x}: {e}", next);
            env::env_destroy(next);
            continue;
        }
        // SAFETY: `tf` is the trap frame last saved for `next`, which is
        // about to become the current environment; the address space has
        // just been switched to match.
        unsafe {
            env_pop_tf(&tf);
        }
    }
}

/// `yield`: give up the CPU voluntarily. Implemented identically to the
/// scheduler's normal re-entry — there is no separate "resume where I left
/// off" path since a syscall's own return already rewrites the trap frame
/// before this is called.
pub fn do_yield(current: EnvId) -> ! {
    env::env_set_status(current, chronos_abi::env::EnvStatus::Runnable).ok();
    run()
}
