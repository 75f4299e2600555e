use crate::{BlockError, Result};

/// Address of one block on a device. Block-range primitives address whole
/// blocks only; byte offsets are converted via [`Geometry`].
pub type BlockAddr = u32;

/// Fixed transfer geometry of a device.
///
/// `block_size` is always a power of two, so block/offset conversions are
/// shifts and masks. `total_len` may exceed `block_count << block_shift` when
/// a device's byte length is not a block multiple; the trailing fragment is
/// then unreachable through the block primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    block_size: u32,
    block_count: u32,
    block_shift: u32,
    total_len: u64,
}

impl Geometry {
    pub fn from_len(total_len: u64, block_size: u32) -> Result<Self> {
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(BlockError::InvalidConfig(
                "block size must be a power of two",
            ));
        }
        let block_shift = block_size.trailing_zeros();
        let blocks = total_len >> block_shift;
        if blocks > BlockAddr::MAX as u64 {
            return Err(BlockError::BlockCountOverflow { blocks });
        }
        Ok(Self {
            block_size,
            block_count: blocks as u32,
            block_shift,
            total_len,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn block_shift(&self) -> u32 {
        self.block_shift
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Block containing the given byte offset.
    pub fn block_of(&self, offset: u64) -> u64 {
        offset >> self.block_shift
    }

    /// Byte offset within its containing block.
    pub fn offset_in_block(&self, offset: u64) -> usize {
        (offset & (self.block_size as u64 - 1)) as usize
    }
}
