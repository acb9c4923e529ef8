//! Network input daemon: fronts the `net_receive` syscall over
//! `chronos_userland::ns`'s IPC protocol. Paired with `ns_output` per
//! spec.md §2's "two user daemons (input/output) wrap the NIC syscalls in
//! IPC" — this one owns the RX half, `ns_output` owns TX and the MAC
//! query.

#![no_std]
#![no_main]

use chronos_abi::env::PteFlags;
use chronos_abi::error::ChronosError;

use chronos_userland::ns::{NetFrame, NetReply, OP_RECEIVE};
use chronos_userland::syscall;

const NS_INPUT_IO_PAGE: usize = 0x0800_5000;

fn dispatch(opcode: u32) -> NetReply {
    let mut reply = NetReply::EMPTY;

    let result: Result<(), ChronosError> = match opcode {
        OP_RECEIVE => {
            let mut buf = [0u8; chronos_abi::nic::MAX_PACKET_BUF];
            syscall::net_receive(&mut buf).map(|n| {
                reply.data[..n].copy_from_slice(&buf[..n]);
                reply.len = n as u32;
                reply.status = n as i32;
            })
        }
        _ => Err(ChronosError::Inval),
    };

    if let Err(e) = result {
        reply.status = e.code();
    }
    reply
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    syscall::cputs("ns_input: panic\n");
    let _ = syscall::env_destroy(0);
    loop {
        syscall::sys_yield();
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    syscall::page_alloc(0, NS_INPUT_IO_PAGE, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER)
        .expect("ns_input: io page alloc failed");

    syscall::cputs("ns_input: ready\n");

    loop {
        let msg = match chronos_userland::ipc::ipc_recv(NS_INPUT_IO_PAGE, 0) {
            Ok(m) => m,
            Err(_) => continue,
        };

        // Unread; the request carries no frame of its own, only an opcode.
        let _ = unsafe { core::ptr::read(NS_INPUT_IO_PAGE as *const NetFrame) };
        let reply = dispatch(msg.value);
        unsafe {
            core::ptr::write(NS_INPUT_IO_PAGE as *mut NetReply, reply);
        }

        chronos_userland::ipc::ipc_send(msg.from, 0, None, PteFlags::empty());
    }
}
