use crate::device::{BlockDev, BlockIo};
use crate::geometry::{BlockAddr, Geometry};
use crate::registry::DeviceHandle;
use crate::util::checked_end;
use crate::{BlockError, Result};

/// Medium exposing `[base, base + len)` of a parent device as a device of
/// its own, with its own block size.
///
/// All traffic forwards to the parent's byte-range entry points, so a
/// protected window on the parent still applies to writes issued through the
/// subdevice. The byte-granular hooks are overridden to forward directly;
/// the block primitives remain available for callers that address blocks.
pub struct SubDevice {
    parent: DeviceHandle,
    base: u64,
    len: u64,
    block_shift: u32,
}

impl SubDevice {
    fn parent_offset(&self, block: BlockAddr) -> Result<u64> {
        checked_end(self.base, (block as u64) << self.block_shift)
    }
}

impl BlockIo for SubDevice {
    fn read_blocks(&mut self, buf: &mut [u8], block: BlockAddr, count: u32) -> Result<u32> {
        let offset = self.parent_offset(block)?;
        let want = (count as usize) << self.block_shift;
        let got = self.parent.borrow_mut().read(offset, &mut buf[..want])?;
        Ok((got >> self.block_shift) as u32)
    }

    fn write_blocks(&mut self, buf: &[u8], block: BlockAddr, count: u32) -> Result<u32> {
        let offset = self.parent_offset(block)?;
        let want = (count as usize) << self.block_shift;
        let got = self.parent.borrow_mut().write(offset, &buf[..want])?;
        Ok((got >> self.block_shift) as u32)
    }

    fn erase(&mut self, offset: u64, len: u64) -> Result<()> {
        let offset = checked_end(self.base, offset)?;
        self.parent.borrow_mut().erase(offset, len)
    }

    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> Option<Result<u64>> {
        if offset >= self.len {
            return Some(Ok(0));
        }
        let n = (buf.len() as u64).min(self.len - offset) as usize;
        Some(self.parent.borrow_mut().read(self.base + offset, &mut buf[..n]))
    }

    fn write_bytes(&mut self, offset: u64, buf: &[u8]) -> Option<Result<u64>> {
        if offset >= self.len {
            return Some(Ok(0));
        }
        let n = (buf.len() as u64).min(self.len - offset) as usize;
        Some(self.parent.borrow_mut().write(self.base + offset, &buf[..n]))
    }
}

/// Build a device over a byte range of `parent`. The range must lie inside
/// the parent, and `block_size` may differ from the parent's.
pub fn sub_blockdev(
    name: &str,
    parent: DeviceHandle,
    base: u64,
    len: u64,
    block_size: u32,
) -> Result<BlockDev> {
    let end = checked_end(base, len)?;
    if end > parent.borrow().total_len() {
        return Err(BlockError::InvalidConfig(
            "subdevice range escapes the parent device",
        ));
    }
    let geometry = Geometry::from_len(len, block_size)?;
    let ops = SubDevice {
        parent,
        base,
        len,
        block_shift: geometry.block_shift(),
    };
    BlockDev::new(name, len, block_size, Box::new(ops))
}
