//! Timestamp-qualified path resolution and directory record packing.
//!
//! A path is `/dir/.../name[@timestamp-spec]`. The optional `@`-suffix
//! applies to the whole walk: at every component, once the name is found,
//! its history chain is walked backward to the newest version whose
//! timestamp does not exceed the requested time. Without a suffix the
//! requested time is simply "now", which the live-record check below
//! satisfies on the first look (a record's own timestamp is always `<=`
//! the clock that produced it).

use alloc::vec::Vec;

use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_abi::fs::{FileRecord, FileType, BLKFILES, BLKSIZE, FILE_RECORD_SIZE};
use chronos_abi::time::{parse_time, TimeSpec};

use crate::bitmap::Bitmap;
use crate::blockdev::BlockDevice;
use crate::cache::BlockCache;
use crate::record::{self, read_record_at, write_record_at, RecordLoc};

struct ParsedPath<'a> {
    components: Vec<&'a str>,
    requested: i64,
}

fn parse_path<'a>(path: &'a str, now: i64) -> ChronosResult<ParsedPath<'a>> {
    if !path.starts_with('/') {
        return Err(ChronosError::BadPath);
    }
    let (name_part, time_part) = match path.rfind('@') {
        Some(i) => (&path[..i], Some(&path[i + 1..])),
        None => (path, None),
    };
    let requested = match time_part {
        None => now,
        Some(spec) => match parse_time(spec).ok_or(ChronosError::BadPath)? {
            TimeSpec::Absolute(t) => t,
            TimeSpec::Relative(delta) => now + delta,
        },
    };
    let mut components = Vec::new();
    for part in name_part[1..].split('/') {
        if part.is_empty() {
            continue;
        }
        if part == ".." || part == "." {
            return Err(ChronosError::BadPath);
        }
        components.push(part);
    }
    Ok(ParsedPath {
        components,
        requested,
    })
}

/// Walks `rec`'s history chain to the newest version with
/// `timestamp <= requested`. Fails with `NotFound` if even the oldest
/// snapshot postdates the request (the file did not exist yet at that time).
fn find_version<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    mut rec: FileRecord,
    requested: i64,
) -> ChronosResult<FileRecord> {
    loop {
        if rec.timestamp <= requested {
            return Ok(rec);
        }
        if rec.next == 0 {
            return Err(ChronosError::NotFound);
        }
        rec = read_record_at(cache, rec.next, 0)?;
    }
}

fn find_empty_slot<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    block: u32,
) -> ChronosResult<Option<usize>> {
    let mut buf = [0u8; BLKSIZE];
    cache.read(block, &mut buf)?;
    for idx in 0..BLKFILES {
        let rec = crate::record::record_from_bytes(
            &buf[idx * FILE_RECORD_SIZE..(idx + 1) * FILE_RECORD_SIZE],
        );
        if rec.is_free() {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

/// Scans `dir`'s data blocks (as they stand at the version `dir` already
/// names) for an entry called `name`.
fn lookup_in_dir<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    dir: &FileRecord,
    name: &str,
) -> ChronosResult<(RecordLoc, FileRecord)> {
    if !dir.is_directory() {
        return Err(ChronosError::NotFound);
    }
    let nblocks = dir.size as usize / BLKSIZE;
    for i in 0..nblocks {
        let bno = record::get_block_slot(cache, dir, i)?;
        if bno == 0 {
            continue;
        }
        let mut buf = [0u8; BLKSIZE];
        cache.read(bno, &mut buf)?;
        for idx in 0..BLKFILES {
            let rec = crate::record::record_from_bytes(
                &buf[idx * FILE_RECORD_SIZE..(idx + 1) * FILE_RECORD_SIZE],
            );
            if !rec.is_free() && rec.name_str() == name {
                return Ok((RecordLoc::Slot { block: bno, index: idx }, rec));
            }
        }
    }
    Err(ChronosError::NotFound)
}

fn dir_block_index_of<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    dir: &FileRecord,
    block: u32,
) -> ChronosResult<usize> {
    let nblocks = dir.size as usize / BLKSIZE;
    for i in 0..nblocks {
        if record::get_block_slot(cache, dir, i)? == block {
            return Ok(i);
        }
    }
    Err(ChronosError::Inval)
}

/// Resolves `path` to a `(location, record)` pair, applying the path's
/// `@`-suffix (or `now`, if absent) at every directory level.
pub(crate) fn resolve<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    path: &str,
    now: i64,
) -> ChronosResult<(RecordLoc, FileRecord)> {
    let parsed = parse_path(path, now)?;
    let root = record::read_root(cache)?;
    let mut rec = find_version(cache, root, parsed.requested)?;
    let mut loc = RecordLoc::Root;
    for comp in &parsed.components {
        let (child_loc, child) = lookup_in_dir(cache, &rec, comp)?;
        loc = child_loc;
        rec = find_version(cache, child, parsed.requested)?;
    }
    Ok((loc, rec))
}

/// Walks the live (un-versioned) tree to the parent directory of `path`'s
/// final component, returning that parent's location and the component
/// name. Used by operations that mutate the current tree (`file_create`,
/// `file_remove`), which never resolve through history.
fn resolve_parent_live<'a, D: BlockDevice>(
    cache: &mut BlockCache<D>,
    path: &'a str,
) -> ChronosResult<(RecordLoc, FileRecord, &'a str)> {
    if !path.starts_with('/') {
        return Err(ChronosError::BadPath);
    }
    if path.contains('@') {
        return Err(ChronosError::BadPath);
    }
    let mut components: Vec<&str> = path[1..].split('/').filter(|c| !c.is_empty()).collect();
    let name = components.pop().ok_or(ChronosError::BadPath)?;
    if name == ".." || name == "." || name.len() > chronos_abi::fs::MAX_NAME_LEN {
        return Err(ChronosError::BadPath);
    }
    let mut loc = RecordLoc::Root;
    let mut rec = record::read_root(cache)?;
    for comp in components {
        if comp == ".." || comp == "." {
            return Err(ChronosError::BadPath);
        }
        let (child_loc, child) = lookup_in_dir(cache, &rec, comp)?;
        loc = child_loc;
        rec = child;
    }
    Ok((loc, rec, name))
}

pub(crate) fn load_loc<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    loc: RecordLoc,
) -> ChronosResult<FileRecord> {
    match loc {
        RecordLoc::Root => record::read_root(cache),
        RecordLoc::Slot { block, index } => read_record_at(cache, block, index),
    }
}

pub(crate) fn store_loc<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    loc: RecordLoc,
    rec: &FileRecord,
) -> ChronosResult<()> {
    match loc {
        RecordLoc::Root => record::write_root(cache, rec),
        RecordLoc::Slot { block, index } => write_record_at(cache, block, index, rec),
    }
}

/// Finds (or makes, via block-level COW / directory growth) a free
/// directory-record slot in `dir`, returning the block to write into and
/// the slot index.
fn alloc_dir_slot<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    bitmap: &Bitmap,
    dir: &mut FileRecord,
) -> ChronosResult<(u32, usize)> {
    let nblocks = dir.size as usize / BLKSIZE;
    for i in 0..nblocks {
        let bno = record::get_block_slot(cache, dir, i)?;
        if bno == 0 {
            continue;
        }
        if let Some(idx) = find_empty_slot(cache, bno)? {
            let writable = record::writable_block(cache, bitmap, dir, i)?;
            return Ok((writable, idx));
        }
    }
    let i = nblocks;
    let fresh = record::file_get_diskbno(cache, bitmap, dir, i)?;
    dir.size += BLKSIZE as u32;
    Ok((fresh, 0))
}

/// Creates a new regular file or empty directory at `path`. Fails with
/// `FileExists` if the name is already present in the live parent
/// directory. The parent is flushed (snapshotted, if dirty) before its
/// directory block is touched, so any prior directory contents remain
/// reachable through history.
pub(crate) fn file_create<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    bitmap: &Bitmap,
    path: &str,
    is_dir: bool,
    now: i64,
) -> ChronosResult<RecordLoc> {
    let (parent_loc, mut parent, name) = resolve_parent_live(cache, path)?;
    if !parent.is_directory() {
        return Err(ChronosError::BadPath);
    }
    if lookup_in_dir(cache, &parent, name).is_ok() {
        return Err(ChronosError::FileExists);
    }
    crate::file_ops::file_flush(cache, bitmap, &mut parent, now)?;
    let (block, index) = alloc_dir_slot(cache, bitmap, &mut parent)?;
    let mut rec = FileRecord::EMPTY;
    rec.set_name(name);
    rec.file_type = if is_dir {
        FileType::Directory as u8
    } else {
        FileType::Regular as u8
    };
    rec.timestamp = now;
    write_record_at(cache, block, index, &rec)?;
    parent.dirty = 1;
    store_loc(cache, parent_loc, &parent)?;
    Ok(RecordLoc::Slot { block, index })
}

/// Removes a live directory entry by clearing its slot. The containing
/// directory block is block-COW'd first if it is still shared with a
/// history snapshot, so a prior listing of the directory keeps the entry.
pub(crate) fn file_remove<D: BlockDevice>(
    cache: &mut BlockCache<D>,
    bitmap: &Bitmap,
    path: &str,
    now: i64,
) -> ChronosResult<()> {
    let (parent_loc, mut parent, name) = resolve_parent_live(cache, path)?;
    let (loc, _) = lookup_in_dir(cache, &parent, name)?;
    let (block, index) = match loc {
        RecordLoc::Slot { block, index } => (block, index),
        RecordLoc::Root => return Err(ChronosError::BadPath),
    };
    crate::file_ops::file_flush(cache, bitmap, &mut parent, now)?;
    let blk_idx = dir_block_index_of(cache, &parent, block)?;
    let writable = record::writable_block(cache, bitmap, &mut parent, blk_idx)?;
    write_record_at(cache, writable, index, &FileRecord::EMPTY)?;
    parent.dirty = 1;
    store_loc(cache, parent_loc, &parent)?;
    Ok(())
}
