//! The versioned file system, running as its own environment (spec.md
//! §2's "the FS runs as a user environment; client environments
//! communicate with it via IPC"). Owns one in-memory `chronos_fs::Fs`
//! instance and dispatches `chronos_fs::ipc` requests against it in a
//! plain receive loop — the userland analogue of the teacher's own
//! service binaries (`compositor`, `shell`), just serving a different
//! protocol.
//!
//! No on-disk block device exists in this workspace (ATA/IDE PIO is an
//! external seam per spec.md §1), so this server formats a fresh
//! `MemoryBlockDevice`-backed volume at boot; a real deployment would
//! `Fs::mount` an existing disk image instead.

#![no_std]
#![no_main]

use chronos_abi::env::PteFlags;
use chronos_abi::error::ChronosError;
use chronos_fs::ipc::{
    FsReply, FsRequest, MAX_IO, OP_CREATE, OP_HISTORY, OP_OPEN, OP_READ, OP_REMOVE, OP_SET_SIZE,
    OP_SYNC, OP_WRITE,
};
use chronos_fs::MemoryFs;

use chronos_userland::{ipc, syscall};

/// VA this server maps its shared request/reply page at. Independent of
/// `fsclient::FS_IO_PAGE` — each lives in its own address space.
const FSD_IO_PAGE: usize = 0x0800_2000;

/// Total blocks in the in-memory volume this server formats at boot. Far
/// more than any demo or test here needs; picked only to comfortably fit
/// the bitmap and superblock bookkeeping alongside real data blocks.
const FSD_VOLUME_BLOCKS: u32 = 4096;

fn dispatch(fs: &mut MemoryFs, opcode: u32, req: &FsRequest) -> FsReply {
    let mut reply = FsReply::EMPTY;
    let path = req.path_str();

    let result = match opcode {
        OP_CREATE => fs.file_create(path, req.is_dir != 0, req.now).map(|_| 0),
        OP_OPEN => fs.file_open(path, req.now).map(|(_, rec)| {
            reply.size = rec.size;
            reply.timestamp = rec.timestamp;
            0
        }),
        OP_READ => fs.file_open(path, req.now).and_then(|(_, rec)| {
            let mut buf = [0u8; MAX_IO];
            let n = fs.file_read(&rec, req.offset, &mut buf)?;
            reply.data[..n].copy_from_slice(&buf[..n]);
            reply.data_len = n as u32;
            Ok(n)
        }),
        OP_WRITE => fs.file_open(path, req.now).and_then(|(handle, mut rec)| {
            let data = &req.data[..req.data_len as usize];
            fs.file_write(handle, &mut rec, req.offset, data, req.now)
        }),
        OP_SET_SIZE => fs.file_open(path, req.now).and_then(|(handle, mut rec)| {
            fs.file_set_size(handle, &mut rec, req.offset)?;
            Ok(0)
        }),
        OP_HISTORY => fs.file_open(path, req.now).and_then(|(_, rec)| {
            let hist = fs.file_history(&rec)?;
            let n = hist.len().min(reply.history.len());
            reply.history[..n].copy_from_slice(&hist[..n]);
            reply.history_len = n as u32;
            Ok(0)
        }),
        OP_REMOVE => fs.file_remove(path, req.now).map(|_| 0),
        OP_SYNC => fs.fs_sync().map(|_| 0),
        _ => Err(ChronosError::Inval),
    };

    match result {
        Ok(n) => reply.status = n as i32,
        Err(e) => reply.status = e.code(),
    }
    reply
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    syscall::cputs("fsd: panic\n");
    let _ = syscall::env_destroy(0);
    loop {
        syscall::sys_yield();
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    let now = syscall::time_msec();
    let mut fs = chronos_fs::new_memory_fs(FSD_VOLUME_BLOCKS, now).expect("fsd: volume format failed");

    syscall::page_alloc(0, FSD_IO_PAGE, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER)
        .expect("fsd: io page alloc failed");

    syscall::cputs("fsd: ready\n");

    loop {
        let msg = match ipc::ipc_recv(FSD_IO_PAGE, 0) {
            Ok(m) => m,
            Err(_) => continue,
        };

        // SAFETY: the sender's page is now mapped here at `FSD_IO_PAGE`,
        // sized and laid out as `FsRequest` by construction on their end.
        let req = unsafe { core::ptr::read(FSD_IO_PAGE as *const FsRequest) };
        let reply = dispatch(&mut fs, msg.value, &req);
        unsafe {
            core::ptr::write(FSD_IO_PAGE as *mut FsReply, reply);
        }

        ipc::ipc_send(msg.from, 0, None, PteFlags::empty());
    }
}
