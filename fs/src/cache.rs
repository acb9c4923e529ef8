//! Demand-mapped block cache: blocks are read from the device on first
//! touch, mutations mark a slot dirty, and nothing hits the device again
//! until `flush_block`/`flush_all`.

use alloc::vec::Vec;

use chronos_abi::error::ChronosResult;
use chronos_abi::fs::BLKSIZE;

use crate::blockdev::BlockDevice;

/// Bounded so a runaway walk can't grow the cache without limit; generous
/// enough that every block touched by one file operation fits without
/// eviction in ordinary use.
const CACHE_SLOTS: usize = 128;

struct Slot {
    blockno: u32,
    dirty: bool,
    data: [u8; BLKSIZE],
    age: u64,
}

pub struct BlockCache<D: BlockDevice> {
    device: D,
    slots: Vec<Slot>,
    clock: u64,
}

impl<D: BlockDevice> BlockCache<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            slots: Vec::new(),
            clock: 0,
        }
    }

    fn find(&self, blockno: u32) -> Option<usize> {
        self.slots.iter().position(|s| s.blockno == blockno)
    }

    fn touch(&mut self, idx: usize) {
        self.clock += 1;
        self.slots[idx].age = self.clock;
    }

    fn evict_one(&mut self) -> ChronosResult<()> {
        let victim = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.age)
            .map(|(i, _)| i)
            .expect("cache nonempty when eviction is needed");
        if self.slots[victim].dirty {
            let blockno = self.slots[victim].blockno;
            let data = self.slots[victim].data;
            self.device.write_block(blockno, &data)?;
        }
        self.slots.swap_remove(victim);
        Ok(())
    }

    fn load_slot(&mut self, blockno: u32) -> ChronosResult<usize> {
        if let Some(idx) = self.find(blockno) {
            self.touch(idx);
            return Ok(idx);
        }
        if self.slots.len() >= CACHE_SLOTS {
            self.evict_one()?;
        }
        let mut data = [0u8; BLKSIZE];
        self.device.read_block(blockno, &mut data)?;
        self.clock += 1;
        self.slots.push(Slot {
            blockno,
            dirty: false,
            data,
            age: self.clock,
        });
        Ok(self.slots.len() - 1)
    }

    pub fn read(&mut self, blockno: u32, out: &mut [u8; BLKSIZE]) -> ChronosResult<()> {
        let idx = self.load_slot(blockno)?;
        *out = self.slots[idx].data;
        Ok(())
    }

    /// Returns a mutable view of the block, marking it dirty. Callers that
    /// only read should prefer `read` so an untouched block never costs a
    /// spurious write-back.
    pub fn get_mut(&mut self, blockno: u32) -> ChronosResult<&mut [u8; BLKSIZE]> {
        let idx = self.load_slot(blockno)?;
        self.slots[idx].dirty = true;
        Ok(&mut self.slots[idx].data)
    }

    pub fn flush_block(&mut self, blockno: u32) -> ChronosResult<()> {
        if let Some(idx) = self.find(blockno) {
            if self.slots[idx].dirty {
                self.device.write_block(blockno, &self.slots[idx].data)?;
                self.slots[idx].dirty = false;
            }
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> ChronosResult<()> {
        for idx in 0..self.slots.len() {
            if self.slots[idx].dirty {
                let blockno = self.slots[idx].blockno;
                let data = self.slots[idx].data;
                self.device.write_block(blockno, &data)?;
                self.slots[idx].dirty = false;
            }
        }
        Ok(())
    }
}
