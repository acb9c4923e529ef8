//! Network output daemon: owns no hardware state of its own (the NIC
//! driver and its descriptor rings stay kernel-resident, per `spec.md`
//! §4.6) but fronts the `net_transmit`/`mac_addr` syscalls over
//! `chronos_userland::ns`'s IPC protocol, the same way `fsd` fronts the
//! file system. Paired with `ns_input` per spec.md §2's "two user daemons
//! (input/output) wrap the NIC syscalls in IPC".

#![no_std]
#![no_main]

use chronos_abi::env::PteFlags;
use chronos_abi::error::ChronosError;

use chronos_userland::ns::{NetFrame, NetReply, OP_MAC_ADDR, OP_TRANSMIT};
use chronos_userland::syscall;

const NS_OUTPUT_IO_PAGE: usize = 0x0800_4000;

fn dispatch(opcode: u32, frame: &NetFrame) -> NetReply {
    let mut reply = NetReply::EMPTY;

    let result: Result<(), ChronosError> = match opcode {
        OP_TRANSMIT => syscall::net_transmit(&frame.data[..frame.len as usize]).map(|n| {
            reply.status = n as i32;
        }),
        OP_MAC_ADDR => {
            let mac = syscall::mac_addr();
            reply.mac = mac.to_le_bytes()[..6].try_into().unwrap_or([0; 6]);
            reply.status = 0;
            Ok(())
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
    syscall::cputs("ns_output: panic\n");
    let _ = syscall::env_destroy(0);
    loop {
        syscall::sys_yield();
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    syscall::page_alloc(0, NS_OUTPUT_IO_PAGE, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER)
        .expect("ns_output: io page alloc failed");

    syscall::cputs("ns_output: ready\n");

    loop {
        let msg = match chronos_userland::ipc::ipc_recv(NS_OUTPUT_IO_PAGE, 0) {
            Ok(m) => m,
            Err(_) => continue,
        };

        let frame = unsafe { core::ptr::read(NS_OUTPUT_IO_PAGE as *const NetFrame) };
        let reply = dispatch(msg.value, &frame);
        unsafe {
            core::ptr::write(NS_OUTPUT_IO_PAGE as *mut NetReply, reply);
        }

        chronos_userland::ipc::ipc_send(msg.from, 0, None, PteFlags::empty());
    }
}
