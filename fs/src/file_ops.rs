//! Byte-oriented file I/O and the history-chain protocol: `file_read`,
//! `file_write` (block-level copy-on-write against the most recent
//! snapshot), `file_set_size`, `file_flush` (the snapshot splice), and
//! `file_history`.

use alloc::vec::Vec;

use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_abi::fs::{FileRecord, BLKSIZE, MAX_FILE_BLOCKS};

use crate::bitmap::Bitmap;
use crate::blockdev::BlockDevice;
use crate::cache::BlockCache;
use crate::record::{self, get_block_slot};

/// Reads up to `buf.len()` bytes starting at `offset`, stopping at EOF.
/// Returns the number of bytes actually read.
pub(crate) fn file_read<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    rec: &FileRecord,
    offset: u32,
    buf: &mut [u8],
) -> ChronosResult<usize> {
    if offset >= rec.size {
        return Ok(0);
    }
    let want = buf.len().min((rec.size - offset) as usize);
    let mut done = 0usize;
    let mut blk = [0u8; BLKSIZE];
    while done < want {
        let pos = offset as usize + done;
        let i = pos / BLKSIZE;
        let blk_off = pos % BLKSIZE;
        let bno = get_block_slot(cache, rec, i)?;
        let n = (BLKSIZE - blk_off).min(want - done);
        if bno == 0 {
            buf[done..done + n].fill(0);
        } else {
            cache.read(bno, &mut blk)?;
            buf[done..done + n].copy_from_slice(&blk[blk_off..blk_off + n]);
        }
        done += n;
    }
    Ok(done)
}

/// Writes `data` at `offset`, growing `rec.size` if the write extends past
/// the current end of file. Before touching any data, flushes `rec` at
/// `now` if it is dirty, splicing its pre-write state into the history
/// chain so the block-level copy-on-write below has a snapshot to compare
/// against. Each block touched goes through `record::writable_block` so a
/// block still shared with the most recent history snapshot is copied
/// before being overwritten.
pub(crate) fn file_write<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    bitmap: &Bitmap,
    rec: &mut FileRecord,
    offset: u32,
    data: &[u8],
    now: i64,
) -> ChronosResult<usize> {
    let end = offset as usize + data.len();
    if end > MAX_FILE_BLOCKS * BLKSIZE {
        return Err(ChronosError::Inval);
    }
    file_flush(cache, bitmap, rec, now)?;
    let mut done = 0usize;
    while done < data.len() {
        let pos = offset as usize + done;
        let i = pos / BLKSIZE;
        let blk_off = pos % BLKSIZE;
        let n = (BLKSIZE - blk_off).min(data.len() - done);
        let bno = record::writable_block(cache, bitmap, rec, i)?;
        let dest = cache.get_mut(bno)?;
        dest[blk_off..blk_off + n].copy_from_slice(&data[done..done + n]);
        done += n;
    }
    if end as u32 > rec.size {
        rec.size = end as u32;
    }
    rec.dirty = 1;
    Ok(done)
}

/// Truncates or extends a file to exactly `new_size` bytes. Shrinking frees
/// blocks beyond the new end; growing zero-fills the new tail lazily
/// (blocks are allocated on first write, `file_read` already returns zero
/// for holes).
pub(crate) fn file_set_size<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    bitmap: &Bitmap,
    rec: &mut FileRecord,
    new_size: u32,
) -> ChronosResult<()> {
    if new_size as usize > MAX_FILE_BLOCKS * BLKSIZE {
        return Err(ChronosError::Inval);
    }
    if new_size < rec.size {
        let old_blocks = (rec.size as usize + BLKSIZE - 1) / BLKSIZE;
        let new_blocks = (new_size as usize + BLKSIZE - 1) / BLKSIZE;
        for i in new_blocks..old_blocks {
            let bno = get_block_slot(cache, rec, i)?;
            if bno != 0 {
                let shared = rec.next != 0 && {
                    let snap = record::read_record_at(cache, rec.next, 0)?;
                    get_block_slot(cache, &snap, i).unwrap_or(0) == bno
                };
                if !shared {
                    bitmap.free_block(cache, bno)?;
                }
                record::set_block_slot(cache, bitmap, rec, i, 0)?;
            }
        }
    }
    rec.size = new_size;
    rec.dirty = 1;
    Ok(())
}

/// Splices a snapshot of `rec`'s pre-mutation state into its history chain,
/// if `rec` has been written since it was last flushed. Called before any
/// mutation of a record's identity, data, or directory contents, so every
/// version that was ever live remains reachable through `rec.next`.
pub(crate) fn file_flush<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    bitmap: &Bitmap,
    rec: &mut FileRecord,
    now: i64,
) -> ChronosResult<()> {
    if rec.dirty == 0 {
        return Ok(());
    }
    let snapshot = *rec;
    let snap_block = bitmap.alloc_block(cache)?;
    record::write_record_at(cache, snap_block, 0, &snapshot)?;
    cache.flush_block(snap_block)?;
    rec.next = snap_block;
    rec.timestamp = now;
    rec.dirty = 0;
    Ok(())
}

/// Returns every timestamp at which this file had a distinct version,
/// oldest first: every point in its history chain, plus the live
/// version's own timestamp if `rec` is dirty (an uncommitted version is
/// live since that timestamp, same as the original `file_history`'s
/// "skip the live record only if it is not dirty" rule).
pub(crate) fn file_history<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    rec: &FileRecord,
) -> ChronosResult<Vec<i64>> {
    let mut out = Vec::new();
    let mut next = rec.next;
    while next != 0 {
        let snap = record::read_record_at(cache, next, 0)?;
        out.push(snap.timestamp);
        next = snap.next;
    }
    out.reverse();
    if rec.dirty != 0 {
        out.push(rec.timestamp);
    }
    Ok(out)
}
