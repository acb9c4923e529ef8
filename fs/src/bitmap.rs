//! Free-block bitmap: bit set means free, LSB-first within each 32-bit word,
//! stored starting at `BITMAP_START_BLOCK` immediately after the super-block.

use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_abi::fs::{bitmap_blocks, BITMAP_START_BLOCK, BLKSIZE};

use crate::blockdev::BlockDevice;
use crate::cache::BlockCache;

const BITS_PER_BLOCK: u32 = (BLKSIZE as u32) * 8;

/// Stateless view over the on-disk bitmap; all real state lives in the
/// block cache it is handed on every call.
pub struct Bitmap {
    total_blocks: u32,
}

impl Bitmap {
    pub fn new(total_blocks: u32) -> Self {
        Self { total_blocks }
    }

    fn n_bitmap_blocks(&self) -> u32 {
        bitmap_blocks(self.total_blocks)
    }

    fn locate(&self, blockno: u32) -> (u32, usize, u32) {
        let bitmap_block = BITMAP_START_BLOCK + blockno / BITS_PER_BLOCK;
        let bit_in_block = blockno % BITS_PER_BLOCK;
        let word_idx = (bit_in_block / 32) as usize;
        let bit_in_word = bit_in_block % 32;
        (bitmap_block, word_idx, bit_in_word)
    }

    fn read_word<D: BlockDevice>(
        &self,
        cache: &mut BlockCache<D>,
        bitmap_block: u32,
        word_idx: usize,
    ) -> ChronosResult<u32> {
        let buf = cache.get_mut(bitmap_block)?;
        Ok(u32::from_le_bytes(
            buf[word_idx * 4..word_idx * 4 + 4].try_into().unwrap(),
        ))
    }

    fn write_word<D: BlockDevice>(
        &self,
        cache: &mut BlockCache<D>,
        bitmap_block: u32,
        word_idx: usize,
        word: u32,
    ) -> ChronosResult<()> {
        let buf = cache.get_mut(bitmap_block)?;
        buf[word_idx * 4..word_idx * 4 + 4].copy_from_slice(&word.to_le_bytes());
        Ok(())
    }

    /// Marks `blockno` in-use (clears its bit) and flushes the affected
    /// bitmap block immediately, so block allocation is never lost to a
    /// crash between alloc and the next unrelated flush.
    pub fn mark_used<D: BlockDevice>(
        &self,
        cache: &mut BlockCache<D>,
        blockno: u32,
    ) -> ChronosResult<()> {
        let (bb, w, bit) = self.locate(blockno);
        let word = self.read_word(cache, bb, w)?;
        self.write_word(cache, bb, w, word & !(1 << bit))?;
        cache.flush_block(bb)
    }

    /// Marks `blockno` free again (sets its bit) and flushes immediately.
    pub fn free_block<D: BlockDevice>(
        &self,
        cache: &mut BlockCache<D>,
        blockno: u32,
    ) -> ChronosResult<()> {
        let (bb, w, bit) = self.locate(blockno);
        let word = self.read_word(cache, bb, w)?;
        self.write_word(cache, bb, w, word | (1 << bit))?;
        cache.flush_block(bb)
    }

    pub fn is_free<D: BlockDevice>(
        &self,
        cache: &mut BlockCache<D>,
        blockno: u32,
    ) -> ChronosResult<bool> {
        let (bb, w, bit) = self.locate(blockno);
        let word = self.read_word(cache, bb, w)?;
        Ok(word & (1 << bit) != 0)
    }

    /// Finds the lowest-numbered free block, marks it used, and returns it.
    pub fn alloc_block<D: BlockDevice>(&self, cache: &mut BlockCache<D>) -> ChronosResult<u32> {
        for bb_idx in 0..self.n_bitmap_blocks() {
            let bb = BITMAP_START_BLOCK + bb_idx;
            for word_idx in 0..(BLKSIZE / 4) {
                let word = self.read_word(cache, bb, word_idx)?;
                if word == 0 {
                    continue;
                }
                let bit = word.trailing_zeros();
                let blockno = bb_idx * BITS_PER_BLOCK + (word_idx as u32) * 32 + bit;
                if blockno >= self.total_blocks {
                    continue;
                }
                self.write_word(cache, bb, word_idx, word & !(1 << bit))?;
                cache.flush_block(bb)?;
                return Ok(blockno);
            }
        }
        Err(ChronosError::NoMem)
    }

    /// Formats a fresh bitmap: every in-range block free, every
    /// out-of-range tail bit (padding beyond `total_blocks` within the last
    /// bitmap block) permanently marked used so it can never be handed out.
    pub fn format<D: BlockDevice>(&self, cache: &mut BlockCache<D>) -> ChronosResult<()> {
        let nblocks = self.n_bitmap_blocks();
        for bb_idx in 0..nblocks {
            let bb = BITMAP_START_BLOCK + bb_idx;
            let buf = cache.get_mut(bb)?;
            buf.fill(0xFF);
        }
        let total_bits = nblocks * BITS_PER_BLOCK;
        for blockno in self.total_blocks..total_bits {
            let (bb, w, bit) = self.locate(blockno);
            let word = self.read_word(cache, bb, w)?;
            self.write_word(cache, bb, w, word & !(1 << bit))?;
        }
        for bb_idx in 0..nblocks {
            cache.flush_block(BITMAP_START_BLOCK + bb_idx)?;
        }
        Ok(())
    }
}
