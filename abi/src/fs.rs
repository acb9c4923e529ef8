//! On-disk layout for the versioned file system (`spec.md` §3, §6).
//!
//! Every struct here is `#[repr(C)]` with explicit field order so that the
//! byte layout matches what `chronos-fs` reads and writes to the block
//! device, mirroring the teacher's `Ext2Inode`/`Ext2Superblock` convention
//! in `fs/src/ext2.rs` of keeping on-disk shapes as plain `repr(C)` structs
//! next to the code that (de)serializes them.

/// Bytes per block. 4 KiB, matching the page size so the block cache can
/// demand-map blocks 1:1 onto page frames.
pub const BLKSIZE: usize = 4096;

/// Fixed size of one on-disk file record.
pub const FILE_RECORD_SIZE: usize = 256;

/// Number of direct block slots in a file record.
pub const NDIRECT: usize = 10;

/// Number of block-number slots held by one indirect block.
pub const NINDIRECT: usize = BLKSIZE / 4;

/// Maximum block index reachable via direct + indirect slots.
pub const MAX_FILE_BLOCKS: usize = NDIRECT + NINDIRECT;

/// Bound on the name field inside a [`FileRecord`].
pub const MAX_NAME_LEN: usize = 128;

/// Number of [`FileRecord`]s packed into one directory block.
pub const BLKFILES: usize = BLKSIZE / FILE_RECORD_SIZE;

/// Disk block holding the super-block.
pub const SUPERBLOCK_BLOCK: u32 = 1;

/// First block of the free-space bitmap.
pub const BITMAP_START_BLOCK: u32 = 2;

/// Magic value stamped into [`SuperBlock::magic`] to sanity-check the image.
pub const FS_MAGIC: u32 = 0x4652_4654; // "TFRF" little-endian-ish, arbitrary but stable

/// File type tag stored in [`FileRecord::file_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    Regular = 0,
    Directory = 1,
}

/// One version of one file. 256 bytes exactly on disk.
///
/// `next` is the disk block number of the file record holding the
/// immediately older version of this same file (0 = no older version,
/// terminating the [history chain](crate) — see `spec.md` §3/§4.7).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FileRecord {
    pub name: [u8; MAX_NAME_LEN],
    pub size: u32,
    pub file_type: u8,
    pub dirty: u8,
    _pad: [u8; 2],
    pub direct: [u32; NDIRECT],
    pub indirect: u32,
    pub next: u32,
    pub timestamp: i64,
}

const _: () = assert!(core::mem::size_of::<FileRecord>() <= FILE_RECORD_SIZE);

impl FileRecord {
    /// An all-zero record: empty name marks the slot free (`spec.md` §3).
    pub const EMPTY: FileRecord = FileRecord {
        name: [0; MAX_NAME_LEN],
        size: 0,
        file_type: FileType::Regular as u8,
        dirty: 0,
        _pad: [0; 2],
        direct: [0; NDIRECT],
        indirect: 0,
        next: 0,
        timestamp: 0,
    };

    /// A record with an empty `name` is a free slot.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory as u8
    }

    /// Name as a `&str`, stopping at the first NUL.
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = [0; MAX_NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(MAX_NAME_LEN - 1);
        self.name[..n].copy_from_slice(&bytes[..n]);
    }
}

/// Block 1. Identifies the image and roots the directory tree.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SuperBlock {
    pub magic: u32,
    pub total_blocks: u32,
    pub root: FileRecord,
}

impl SuperBlock {
    pub fn is_valid(&self) -> bool {
        self.magic == FS_MAGIC
    }
}

/// Number of bitmap blocks needed to cover `total_blocks` blocks, one bit
/// per block.
#[inline]
pub const fn bitmap_blocks(total_blocks: u32) -> u32 {
    let bits_per_block = (BLKSIZE * 8) as u32;
    total_blocks.div_ceil(bits_per_block)
}
