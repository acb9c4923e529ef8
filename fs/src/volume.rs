//! The mounted file system: ties the bitmap, block cache, and record/path
//! modules together behind the operation list in spec §4.7.

use alloc::vec::Vec;

use chronos_abi::error::ChronosResult;
use chronos_abi::fs::{FileRecord, FileType, SuperBlock, BITMAP_START_BLOCK, FS_MAGIC, SUPERBLOCK_BLOCK};

use crate::bitmap::Bitmap;
use crate::blockdev::BlockDevice;
use crate::cache::BlockCache;
use crate::file_ops;
use crate::path;

pub use crate::record::RecordLoc as FileHandle;

pub struct Fs<D: BlockDevice> {
    cache: BlockCache<D>,
    bitmap: Bitmap,
    total_blocks: u32,
}

impl<D: BlockDevice> Fs<D> {
    /// Formats a fresh file system over `device`: block 0 reserved (boot
    /// block, matching the convention the root record's block numbering
    /// leaves unused), block 1 the super-block, the bitmap immediately
    /// after, and an empty root directory.
    pub fn format(device: D, now: i64) -> ChronosResult<Self> {
        let total_blocks = device.block_count();
        let bitmap = Bitmap::new(total_blocks);
        let mut cache = BlockCache::new(device);

        bitmap.format(&mut cache)?;
        bitmap.mark_used(&mut cache, 0)?;
        bitmap.mark_used(&mut cache, SUPERBLOCK_BLOCK)?;
        for b in 0..chronos_abi::fs::bitmap_blocks(total_blocks) {
            bitmap.mark_used(&mut cache, BITMAP_START_BLOCK + b)?;
        }

        let mut root = FileRecord::EMPTY;
        root.file_type = FileType::Directory as u8;
        root.timestamp = now;
        let sb = SuperBlock {
            magic: FS_MAGIC,
            total_blocks,
            root,
        };
        {
            let buf = cache.get_mut(SUPERBLOCK_BLOCK)?;
            crate::record::superblock_to_bytes(&sb, buf);
        }
        cache.flush_block(SUPERBLOCK_BLOCK)?;

        Ok(Self {
            cache,
            bitmap,
            total_blocks,
        })
    }

    /// Mounts an existing image, validating the super-block magic.
    pub fn mount(device: D) -> ChronosResult<Self> {
        let mut cache = BlockCache::new(device);
        let mut buf = [0u8; chronos_abi::fs::BLKSIZE];
        cache.read(SUPERBLOCK_BLOCK, &mut buf)?;
        let sb = crate::record::superblock_from_bytes(&buf);
        if !sb.is_valid() {
            return Err(chronos_abi::error::ChronosError::NoDisk);
        }
        let bitmap = Bitmap::new(sb.total_blocks);
        Ok(Self {
            cache,
            bitmap,
            total_blocks: sb.total_blocks,
        })
    }

    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    pub fn file_create(&mut self, path: &str, is_dir: bool, now: i64) -> ChronosResult<FileHandle> {
        path::file_create(&mut self.cache, &self.bitmap, path, is_dir, now)
    }

    pub fn file_remove(&mut self, path: &str, now: i64) -> ChronosResult<()> {
        path::file_remove(&mut self.cache, &self.bitmap, path, now)
    }

    /// Resolves a (possibly time-qualified) path to an open handle and the
    /// record as it stood at the requested time.
    pub fn file_open(&mut self, path: &str, now: i64) -> ChronosResult<(FileHandle, FileRecord)> {
        path::resolve(&mut self.cache, path, now)
    }

    pub fn file_read(&mut self, rec: &FileRecord, offset: u32, buf: &mut [u8]) -> ChronosResult<usize> {
        file_ops::file_read(&mut self.cache, rec, offset, buf)
    }

    /// Writes through `handle`'s live record, persisting the updated
    /// record back to its slot. Flushes `rec` at `now` first if it is
    /// dirty (spec.md §4.7: "before any write to a file's data, the
    /// system first calls `file_flush(f, now)`"), so every write after the
    /// first opens a new history boundary instead of silently overwriting
    /// the previous version in place. Writing to a historical handle (one
    /// returned for a past `@`-qualified open) is permitted at the storage
    /// layer but callers should not expect it to be reachable again —
    /// history is addressed by time, not by handle identity.
    pub fn file_write(
        &mut self,
        handle: FileHandle,
        rec: &mut FileRecord,
        offset: u32,
        data: &[u8],
        now: i64,
    ) -> ChronosResult<usize> {
        let n = file_ops::file_write(&mut self.cache, &self.bitmap, rec, offset, data, now)?;
        path::store_loc(&mut self.cache, handle, rec)?;
        Ok(n)
    }

    pub fn file_set_size(
        &mut self,
        handle: FileHandle,
        rec: &mut FileRecord,
        new_size: u32,
    ) -> ChronosResult<()> {
        file_ops::file_set_size(&mut self.cache, &self.bitmap, rec, new_size)?;
        path::store_loc(&mut self.cache, handle, rec)
    }

    /// Forces the versioning protocol on `handle` at `now`, even if no
    /// write is pending — used by operations (directory mutation) that
    /// need a snapshot boundary without themselves being a `file_write`.
    pub fn file_flush_at(&mut self, handle: FileHandle, rec: &mut FileRecord, now: i64) -> ChronosResult<()> {
        file_ops::file_flush(&mut self.cache, &self.bitmap, rec, now)?;
        path::store_loc(&mut self.cache, handle, rec)
    }

    pub fn file_history(&mut self, rec: &FileRecord) -> ChronosResult<Vec<i64>> {
        file_ops::file_history(&mut self.cache, rec)
    }

    /// Flushes every dirty cached block to the device.
    pub fn fs_sync(&mut self) -> ChronosResult<()> {
        self.cache.flush_all()
    }
}

pub type MemoryFs = Fs<crate::blockdev::MemoryBlockDevice>;

/// Convenience constructor for tests and for an FS environment with no
/// disk driver attached.
pub fn new_memory_fs(total_blocks: u32, now: i64) -> ChronosResult<MemoryFs> {
    Fs::format(crate::blockdev::MemoryBlockDevice::new(total_blocks), now)
}
