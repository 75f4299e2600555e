use crate::device::{BlockDev, BlockIo};
use crate::geometry::BlockAddr;
use crate::{BlockError, Result};

/// Memory-backed block medium. Supplies only the block primitives; byte
/// access goes through the generic deblocking engines.
pub struct MemDevice {
    data: Vec<u8>,
    block_shift: u32,
}

impl MemDevice {
    fn block_count(&self) -> u64 {
        (self.data.len() >> self.block_shift) as u64
    }
}

impl BlockIo for MemDevice {
    fn read_blocks(&mut self, buf: &mut [u8], block: BlockAddr, count: u32) -> Result<u32> {
        let start = block as u64;
        if start >= self.block_count() {
            return Err(BlockError::Io(format!("block {block} out of range")));
        }
        // Short transfer at the end of the medium.
        let count = (count as u64).min(self.block_count() - start) as u32;
        let nbytes = (count as usize) << self.block_shift;
        let off = (start as usize) << self.block_shift;
        buf[..nbytes].copy_from_slice(&self.data[off..off + nbytes]);
        Ok(count)
    }

    fn write_blocks(&mut self, buf: &[u8], block: BlockAddr, count: u32) -> Result<u32> {
        let start = block as u64;
        if start >= self.block_count() {
            return Err(BlockError::Io(format!("block {block} out of range")));
        }
        let count = (count as u64).min(self.block_count() - start) as u32;
        let nbytes = (count as usize) << self.block_shift;
        let off = (start as usize) << self.block_shift;
        self.data[off..off + nbytes].copy_from_slice(&buf[..nbytes]);
        Ok(count)
    }
}

/// Build a memory-backed device over `data`, whose length must be a multiple
/// of `block_size`.
pub fn mem_blockdev(name: &str, data: Vec<u8>, block_size: u32) -> Result<BlockDev> {
    let total_len = data.len() as u64;
    let geometry = crate::Geometry::from_len(total_len, block_size)?;
    if data.len() & (block_size as usize - 1) != 0 {
        return Err(BlockError::InvalidConfig(
            "memory device length must be a multiple of the block size",
        ));
    }
    let ops = MemDevice {
        data,
        block_shift: geometry.block_shift(),
    };
    BlockDev::new(name, total_len, block_size, Box::new(ops))
}
