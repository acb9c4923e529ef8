//! Client-side binding for the wire protocol in `chronos_fs::ipc`: fills an
//! `FsRequest` on a page this process owns, hands it to the FS environment
//! over IPC, and decodes the `FsReply` the server writes back into the
//! same shared physical page.
//!
//! Grounded on `crate::ipc`'s rendezvous helpers and the opcode/struct
//! layout `chronos_fs::ipc` already defines; there is no teacher FS-client
//! counterpart (its file system is kernel-resident), so the request/reply
//! round trip below follows spec.md §4.7/§8 scenario 2 directly: one
//! `ipc_send` carrying the page, one blocking `ipc_recv` for the reply.

use chronos_abi::env::{EnvId, PteFlags};
use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_fs::ipc::{FsReply, FsRequest, OP_CREATE, OP_HISTORY, OP_OPEN, OP_READ, OP_REMOVE, OP_SET_SIZE, OP_SYNC, OP_WRITE};
use chronos_lib::InitFlag;

use crate::ipc;
use crate::syscall;

/// VA this process maps its request/reply page at. Distinct from
/// `fork::FORK_SCAN_TOP` and the libc heap range so none of the three
/// ever alias.
const FS_IO_PAGE: usize = 0x0800_1000;

static FS_IO_INIT: InitFlag = InitFlag::new();

fn io_page() -> ChronosResult<*mut FsRequest> {
    if FS_IO_INIT.init_once() {
        syscall::page_alloc(0, FS_IO_PAGE, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER)?;
    }
    Ok(FS_IO_PAGE as *mut FsRequest)
}

/// A bound connection to one FS server environment.
pub struct FsClient {
    server: EnvId,
}

impl FsClient {
    pub fn connect(server: EnvId) -> Self {
        Self { server }
    }

    fn roundtrip(&self, opcode: u32, req: &FsRequest) -> ChronosResult<FsReply> {
        let page = io_page()?;
        // SAFETY: `page` is a page this process just mapped writable; no
        // other thread of execution in this address space touches it.
        unsafe {
            core::ptr::write(page, *req);
        }

        ipc::ipc_send(self.server, opcode, Some(FS_IO_PAGE), PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER);
        // The reply lands back in this same physical page (the server
        // wrote it in place before replying); the rendezvous itself is
        // what `ipc_recv` blocks on.
        let _ = ipc::ipc_recv(FS_IO_PAGE, self.server)?;

        let reply = unsafe { core::ptr::read(FS_IO_PAGE as *const FsReply) };
        if reply.status < 0 {
            return Err(ChronosError::from_code(-reply.status).unwrap_or(ChronosError::Inval));
        }
        Ok(reply)
    }

    pub fn create(&self, path: &str, is_dir: bool, now: i64) -> ChronosResult<()> {
        let mut req = FsRequest::EMPTY;
        req.set_path(path);
        req.is_dir = is_dir as u8;
        req.now = now;
        self.roundtrip(OP_CREATE, &req).map(|_| ())
    }

    pub fn open(&self, path: &str, now: i64) -> ChronosResult<u32> {
        let mut req = FsRequest::EMPTY;
        req.set_path(path);
        req.now = now;
        self.roundtrip(OP_OPEN, &req).map(|r| r.size)
    }

    pub fn read(&self, path: &str, now: i64, offset: u32, buf: &mut [u8]) -> ChronosResult<usize> {
        let mut req = FsRequest::EMPTY;
        req.set_path(path);
        req.now = now;
        req.offset = offset;
        let reply = self.roundtrip(OP_READ, &req)?;
        let n = (reply.data_len as usize).min(buf.len());
        buf[..n].copy_from_slice(&reply.data[..n]);
        Ok(n)
    }

    pub fn write(&self, path: &str, now: i64, offset: u32, data: &[u8]) -> ChronosResult<usize> {
        let mut req = FsRequest::EMPTY;
        req.set_path(path);
        req.now = now;
        req.offset = offset;
        let n = data.len().min(req.data.len());
        req.data[..n].copy_from_slice(&data[..n]);
        req.data_len = n as u32;
        let reply = self.roundtrip(OP_WRITE, &req)?;
        Ok(reply.status as usize)
    }

    pub fn set_size(&self, path: &str, now: i64, new_size: u32) -> ChronosResult<()> {
        let mut req = FsRequest::EMPTY;
        req.set_path(path);
        req.now = now;
        req.offset = new_size;
        self.roundtrip(OP_SET_SIZE, &req).map(|_| ())
    }

    pub fn history(&self, path: &str) -> ChronosResult<([i64; chronos_fs::ipc::MAX_HISTORY], usize)> {
        let mut req = FsRequest::EMPTY;
        req.set_path(path);
        let reply = self.roundtrip(OP_HISTORY, &req)?;
        Ok((reply.history, reply.history_len as usize))
    }

    pub fn remove(&self, path: &str, now: i64) -> ChronosResult<()> {
        let mut req = FsRequest::EMPTY;
        req.set_path(path);
        req.now = now;
        self.roundtrip(OP_REMOVE, &req).map(|_| ())
    }

    pub fn sync(&self) -> ChronosResult<()> {
        let req = FsRequest::EMPTY;
        self.roundtrip(OP_SYNC, &req).map(|_| ())
    }
}
