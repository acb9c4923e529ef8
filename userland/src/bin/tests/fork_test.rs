//! Fork + IPC round trip, driven end to end against the real syscall
//! surface: `spec.md` §8 scenario 1 (COW fork — parent and child must
//! observe different bytes at the same VA after the parent's post-fork
//! write) composed with scenario 4's rendezvous (the child reports what
//! it saw back to the parent over IPC, since there is no shared console
//! buffer to assert against otherwise).

#![no_std]
#![no_main]

use chronos_abi::env::PteFlags;
use chronos_userland::{fork, ipc, libc, syscall};

const SHARED_VA: usize = 0x0080_0000;
const IPC_VA: usize = 0x0020_0000;

fn fail(msg: &str) -> ! {
    syscall::cputs("fork_test: FAIL: ");
    syscall::cputs(msg);
    syscall::cputs("\n");
    libc::sys_exit(1)
}

fn child_main() -> ! {
    // SAFETY: this page was mapped (COW, from the parent) before `fork`
    // returned here; reading one byte from it cannot fault.
    let observed = unsafe { *(SHARED_VA as *const u8) };
    let parent = syscall::parent_envid();
    ipc::ipc_send(parent, observed as u32, None, PteFlags::empty());
    libc::sys_exit(0)
}

#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    if syscall::page_alloc(0, SHARED_VA, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER).is_err() {
        fail("page_alloc failed");
    }
    // SAFETY: just mapped, writable, ours alone.
    unsafe {
        *(SHARED_VA as *mut u8) = 0xAA;
    }

    match fork::fork() {
        Ok(0) => child_main(),
        Ok(child) => {
            // SAFETY: still our own writable mapping; COW hasn't broken
            // yet at this point, so this write triggers the page-fault
            // handler's private copy rather than touching the child's.
            unsafe {
                *(SHARED_VA as *mut u8) = 0xBB;
            }

            let msg = match ipc::ipc_recv(IPC_VA, child) {
                Ok(m) => m,
                Err(_) => fail("ipc_recv from child failed"),
            };

            if msg.value != 0xAA {
                fail("child observed wrong byte after fork (COW did not isolate the parent's write)");
            }

            let parent_byte = unsafe { *(SHARED_VA as *const u8) };
            if parent_byte != 0xBB {
                fail("parent's own post-fork write did not survive");
            }

            syscall::cputs("fork_test: PASS\n");
            libc::sys_exit(0)
        }
        Err(_) => fail("fork() failed"),
    }
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    syscall::cputs("fork_test: panic\n");
    libc::sys_exit(2)
}
