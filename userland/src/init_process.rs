//! The first environment the scheduler runs. Demonstrates the
//! copy-on-write `fork` primitive (`spec.md` §4.4, §8 scenario 1) and
//! then idles.
//!
//! There is no ELF loader in this workspace to `exec` a shell or service
//! binaries into a freshly forked child (`spec.md` §1's out-of-scope
//! list) — `fsd`/`ns_input`/`ns_output` are meant to be their own
//! environments from the moment the boot path creates them, not children
//! `init` execs into —
//! so this has nothing more productive to do with the child than prove
//! the primitive works and let it idle too.

use crate::fork;
use crate::syscall;

pub fn init_user_main(_arg: *mut u8) {
    syscall::cputs("init: starting\n");

    match fork::fork() {
        Ok(0) => {
            // `fork` returns `Ok(0)` only to the child, resumed here with
            // its own copy-on-write address space.
            syscall::cputs("init: child environment running\n");
            loop {
                syscall::sys_yield();
            }
        }
        Ok(_child) => {
            syscall::cputs("init: forked a child environment\n");
        }
        Err(_) => {
            syscall::cputs("init: fork failed\n");
        }
    }

    loop {
        syscall::sys_yield();
    }
}
