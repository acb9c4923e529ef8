//! `FileRecord` storage and the per-file block map (direct + one indirect
//! block of pointers), plus the block-level copy-on-write that keeps a
//! history snapshot's view of a file's data intact after the live record
//! writes through a block the snapshot still points at.

use core::convert::TryInto;

use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_abi::fs::{
    FileRecord, SuperBlock, BLKFILES, BLKSIZE, FILE_RECORD_SIZE, MAX_FILE_BLOCKS, NDIRECT,
    SUPERBLOCK_BLOCK,
};

use crate::blockdev::BlockDevice;
use crate::cache::BlockCache;

/// Where a `FileRecord` lives: either the one root record packed into the
/// super-block, or a slot inside a directory's data block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordLoc {
    Root,
    Slot { block: u32, index: usize },
}

pub(crate) fn record_from_bytes(bytes: &[u8]) -> FileRecord {
    debug_assert!(bytes.len() >= FILE_RECORD_SIZE);
    unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const FileRecord) }
}

pub(crate) fn record_to_bytes(rec: &FileRecord, out: &mut [u8]) {
    debug_assert!(out.len() >= FILE_RECORD_SIZE);
    unsafe {
        core::ptr::write_unaligned(out.as_mut_ptr() as *mut FileRecord, *rec);
    }
}

pub(crate) fn superblock_from_bytes(bytes: &[u8]) -> SuperBlock {
    unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const SuperBlock) }
}

pub(crate) fn superblock_to_bytes(sb: &SuperBlock, out: &mut [u8]) {
    unsafe {
        core::ptr::write_unaligned(out.as_mut_ptr() as *mut SuperBlock, *sb);
    }
}

/// Reads the record at `(block, index)` out of a directory's data block.
pub(crate) fn read_record_at<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    block: u32,
    index: usize,
) -> ChronosResult<FileRecord> {
    if index >= BLKFILES {
        return Err(ChronosError::Inval);
    }
    let mut buf = [0u8; BLKSIZE];
    cache.read(block, &mut buf)?;
    Ok(record_from_bytes(
        &buf[index * FILE_RECORD_SIZE..(index + 1) * FILE_RECORD_SIZE],
    ))
}

pub(crate) fn write_record_at<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    block: u32,
    index: usize,
    rec: &FileRecord,
) -> ChronosResult<()> {
    if index >= BLKFILES {
        return Err(ChronosError::Inval);
    }
    let buf = cache.get_mut(block)?;
    record_to_bytes(rec, &mut buf[index * FILE_RECORD_SIZE..(index + 1) * FILE_RECORD_SIZE]);
    Ok(())
}

pub(crate) fn read_root<D: BlockDevice>(cache: &mut BlockCache<D>) -> ChronosResult<FileRecord> {
    let mut buf = [0u8; BLKSIZE];
    cache.read(SUPERBLOCK_BLOCK, &mut buf)?;
    let sb = superblock_from_bytes(&buf);
    Ok(sb.root)
}

pub(crate) fn write_root<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    root: &FileRecord,
) -> ChronosResult<()> {
    let mut buf = [0u8; BLKSIZE];
    cache.read(SUPERBLOCK_BLOCK, &mut buf)?;
    let mut sb = superblock_from_bytes(&buf);
    sb.root = *root;
    let out = cache.get_mut(SUPERBLOCK_BLOCK)?;
    superblock_to_bytes(&sb, out);
    Ok(())
}

/// Reads the disk block number stored for logical block `i` of `rec`,
/// without allocating. Returns 0 (a real block number never used for file
/// data) when the slot has never been written.
pub(crate) fn get_block_slot<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    rec: &FileRecord,
    i: usize,
) -> ChronosResult<u32> {
    if i >= MAX_FILE_BLOCKS {
        return Err(ChronosError::Inval);
    }
    if i < NDIRECT {
        return Ok(rec.direct[i]);
    }
    if rec.indirect == 0 {
        return Ok(0);
    }
    let mut buf = [0u8; BLKSIZE];
    cache.read(rec.indirect, &mut buf)?;
    let off = (i - NDIRECT) * 4;
    Ok(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()))
}

/// Writes a disk block number into `rec`'s logical slot `i`, allocating the
/// indirect block on first use of an indirect slot.
pub(crate) fn set_block_slot<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    bitmap: &crate::bitmap::Bitmap,
    rec: &mut FileRecord,
    i: usize,
    blockno: u32,
) -> ChronosResult<()> {
    if i >= MAX_FILE_BLOCKS {
        return Err(ChronosError::Inval);
    }
    if i < NDIRECT {
        rec.direct[i] = blockno;
        return Ok(());
    }
    if rec.indirect == 0 {
        let ind = bitmap.alloc_block(cache)?;
        {
            let buf = cache.get_mut(ind)?;
            buf.fill(0);
        }
        cache.flush_block(ind)?;
        rec.indirect = ind;
    }
    let off = (i - NDIRECT) * 4;
    let buf = cache.get_mut(rec.indirect)?;
    buf[off..off + 4].copy_from_slice(&blockno.to_le_bytes());
    Ok(())
}

/// Returns the disk block backing logical block `i` of `rec`, allocating a
/// fresh zeroed block (and, for directories/files that grow, extending
/// `rec.size`'s implied block count) if the slot is empty.
pub(crate) fn file_get_diskbno<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    bitmap: &crate::bitmap::Bitmap,
    rec: &mut FileRecord,
    i: usize,
) -> ChronosResult<u32> {
    if i >= MAX_FILE_BLOCKS {
        return Err(ChronosError::Inval);
    }
    let existing = get_block_slot(cache, rec, i)?;
    if existing != 0 {
        return Ok(existing);
    }
    let fresh = bitmap.alloc_block(cache)?;
    {
        let buf = cache.get_mut(fresh)?;
        buf.fill(0);
    }
    cache.flush_block(fresh)?;
    set_block_slot(cache, bitmap, rec, i, fresh)?;
    Ok(fresh)
}

/// Returns a block of `rec`'s data that is safe to mutate in place: if
/// logical block `i` is currently the same physical block the most recent
/// history snapshot (`rec.next`) also points at, the block is copied first
/// so the snapshot keeps its old contents.
pub(crate) fn writable_block<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    bitmap: &crate::bitmap::Bitmap,
    rec: &mut FileRecord,
    i: usize,
) -> ChronosResult<u32> {
    let bno = file_get_diskbno(cache, bitmap, rec, i)?;
    if rec.next == 0 {
        return Ok(bno);
    }
    let snapshot = read_record_at(cache, rec.next, 0)?;
    let shared = get_block_slot(cache, &snapshot, i).unwrap_or(0);
    if shared == 0 || shared != bno {
        return Ok(bno);
    }
    let mut old = [0u8; BLKSIZE];
    cache.read(bno, &mut old)?;
    let fresh = bitmap.alloc_block(cache)?;
    {
        let buf = cache.get_mut(fresh)?;
        *buf = old;
    }
    cache.flush_block(fresh)?;
    set_block_slot(cache, bitmap, rec, i, fresh)?;
    Ok(fresh)
}
