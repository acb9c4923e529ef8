//! IPC-facing wire protocol and client binding for the network daemons
//! (`bin/ns_input.rs`, `bin/ns_output.rs`): bridges the
//! `net_transmit`/`net_receive`/`mac_addr` syscalls (`spec.md` §4.6) to the
//! same request/page/reply shape `chronos_fs::ipc` uses for the file
//! system, so a client that wants to talk to the network without a raw
//! syscall (e.g. because it isn't the one environment with permission to
//! touch the NIC) goes through the two daemons instead — `ns_output` for
//! transmit and the MAC query, `ns_input` for receive, per spec.md §2's
//! "two user daemons (input/output) wrap the NIC syscalls in IPC".
//!
//! No teacher counterpart exists for this (its network stack, if any, is
//! kernel-resident); the request/reply/rendezvous shape mirrors
//! `crate::fsclient` directly.

use chronos_abi::env::{EnvId, PteFlags};
use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_abi::nic::MAX_PACKET_BUF;
use chronos_lib::InitFlag;

use crate::ipc;
use crate::syscall;

pub const OP_TRANSMIT: u32 = 1;
pub const OP_RECEIVE: u32 = 2;
pub const OP_MAC_ADDR: u32 = 3;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct NetFrame {
    pub len: u32,
    pub data: [u8; MAX_PACKET_BUF],
}

impl NetFrame {
    pub const EMPTY: NetFrame = NetFrame {
        len: 0,
        data: [0; MAX_PACKET_BUF],
    };
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct NetReply {
    /// Non-negative on success (byte count for transmit/receive, unused
    /// for `mac_addr`); a negated `ChronosError` code on failure.
    pub status: i32,
    pub len: u32,
    pub mac: [u8; 6],
    pub _pad: [u8; 2],
    pub data: [u8; MAX_PACKET_BUF],
}

impl NetReply {
    pub const EMPTY: NetReply = NetReply {
        status: 0,
        len: 0,
        mac: [0; 6],
        _pad: [0; 2],
        data: [0; MAX_PACKET_BUF],
    };
}

const NS_IO_PAGE: usize = 0x0800_3000;

static NS_IO_INIT: InitFlag = InitFlag::new();

fn io_page() -> ChronosResult<*mut NetFrame> {
    if NS_IO_INIT.init_once() {
        syscall::page_alloc(0, NS_IO_PAGE, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER)?;
    }
    Ok(NS_IO_PAGE as *mut NetFrame)
}

/// A bound connection to both network daemons: transmit and the MAC query
/// go to `output`, receive goes to `input`.
pub struct NetClient {
    input: EnvId,
    output: EnvId,
}

impl NetClient {
    pub fn connect(input: EnvId, output: EnvId) -> Self {
        Self { input, output }
    }

    fn roundtrip(&self, server: EnvId, opcode: u32, frame: &NetFrame) -> ChronosResult<NetReply> {
        let page = io_page()?;
        unsafe {
            core::ptr::write(page, *frame);
        }

        ipc::ipc_send(server, opcode, Some(NS_IO_PAGE), PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER);
        let _ = ipc::ipc_recv(NS_IO_PAGE, server)?;

        let reply = unsafe { core::ptr::read(NS_IO_PAGE as *const NetReply) };
        if reply.status < 0 {
            return Err(ChronosError::from_code(-reply.status).unwrap_or(ChronosError::Inval));
        }
        Ok(reply)
    }

    pub fn transmit(&self, data: &[u8]) -> ChronosResult<usize> {
        let mut frame = NetFrame::EMPTY;
        let n = data.len().min(frame.data.len());
        frame.data[..n].copy_from_slice(&data[..n]);
        frame.len = n as u32;
        let reply = self.roundtrip(self.output, OP_TRANSMIT, &frame)?;
        Ok(reply.status as usize)
    }

    pub fn receive(&self, buf: &mut [u8]) -> ChronosResult<usize> {
        let reply = self.roundtrip(self.input, OP_RECEIVE, &NetFrame::EMPTY)?;
        let n = (reply.len as usize).min(buf.len());
        buf[..n].copy_from_slice(&reply.data[..n]);
        Ok(n)
    }

    pub fn mac_address(&self) -> ChronosResult<[u8; 6]> {
        let reply = self.roundtrip(self.output, OP_MAC_ADDR, &NetFrame::EMPTY)?;
        Ok(reply.mac)
    }
}
