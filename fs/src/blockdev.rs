//! The seam between the versioned file system and a physical disk.
//!
//! `spec.md` §1 names ATA/IDE PIO as an external collaborator: this trait
//! is the boundary a real block driver plugs into. Everything above this
//! line (bitmap, records, history, path walk) only ever talks to a
//! `BlockDevice`, never to hardware directly, matching the teacher's
//! `fs/src/ext2.rs` convention of a trait-typed backing store passed into
//! the filesystem rather than hardwired I/O calls.

use alloc::vec;
use alloc::vec::Vec;

use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_abi::fs::BLKSIZE;

/// One `BLKSIZE`-byte unit of storage, addressed by block number.
pub trait BlockDevice {
    fn read_block(&mut self, blockno: u32, buf: &mut [u8; BLKSIZE]) -> ChronosResult<()>;
    fn write_block(&mut self, blockno: u32, buf: &[u8; BLKSIZE]) -> ChronosResult<()>;
    fn block_count(&self) -> u32;
}

/// An in-memory backing store. Stands in for the real disk in every test
/// in this crate, and is the device the FS environment would use if no
/// disk driver is attached (matching the teacher's `MemoryBlockDevice`
/// used by its own `ext2` test suite for the same reason).
pub struct MemoryBlockDevice {
    blocks: Vec<[u8; BLKSIZE]>,
}

impl MemoryBlockDevice {
    pub fn new(total_blocks: u32) -> Self {
        Self {
            blocks: vec![[0u8; BLKSIZE]; total_blocks as usize],
        }
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn read_block(&mut self, blockno: u32, buf: &mut [u8; BLKSIZE]) -> ChronosResult<()> {
        let block = self
            .blocks
            .get(blockno as usize)
            .ok_or(ChronosError::NoDisk)?;
        *buf = *block;
        Ok(())
    }

    fn write_block(&mut self, blockno: u32, buf: &[u8; BLKSIZE]) -> ChronosResult<()> {
        let block = self
            .blocks
            .get_mut(blockno as usize)
            .ok_or(ChronosError::NoDisk)?;
        *block = *buf;
        Ok(())
    }

    fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }
}
